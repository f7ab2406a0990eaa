//! Token usage reporting.
//!
//! After every successful analysis the session reports who spent how many
//! tokens on which slide. Reporting is fire-and-forget: a failed report is
//! logged and never touches the slide.

use crate::error::LensError;
use crate::model::SlideId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// One successful analysis, as billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: String,
    pub presentation_id: String,
    pub slide_id: SlideId,
    pub page_number: u32,
    pub total_tokens: u64,
}

#[async_trait]
pub trait UsageTracker: Send + Sync {
    async fn record(&self, record: &UsageRecord) -> Result<(), LensError>;
}

/// Discards every report.
pub struct NoopUsageTracker;

#[async_trait]
impl UsageTracker for NoopUsageTracker {
    async fn record(&self, _record: &UsageRecord) -> Result<(), LensError> {
        Ok(())
    }
}

/// Appends one JSON line per report to a file.
pub struct UsageLog {
    path: PathBuf,
    // Serialises appends from concurrent reports.
    write_lock: Mutex<()>,
}

impl UsageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the log, oldest first. A missing log is empty.
    pub async fn read_all(&self) -> Result<Vec<UsageRecord>, LensError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LensError::StoreIo {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).map_err(|source| LensError::Serialization {
                    path: self.path.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Total tokens per user id.
    pub async fn totals_by_user(&self) -> Result<BTreeMap<String, u64>, LensError> {
        let mut totals = BTreeMap::new();
        for r in self.read_all().await? {
            *totals.entry(r.user_id).or_insert(0) += r.total_tokens;
        }
        Ok(totals)
    }
}

#[async_trait]
impl UsageTracker for UsageLog {
    async fn record(&self, record: &UsageRecord) -> Result<(), LensError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| LensError::UsageReportFailed(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LensError::UsageReportFailed(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LensError::UsageReportFailed(format!("{}: {}", self.path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LensError::UsageReportFailed(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| LensError::UsageReportFailed(e.to_string()))?;
        debug!(
            "Recorded {} tokens for {} on slide {}",
            record.total_tokens, record.user_id, record.slide_id
        );
        Ok(())
    }
}
