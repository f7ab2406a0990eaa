//! Input resolution: a user-supplied path, URL or byte buffer becomes a
//! local PDF file pdfium can open.
//!
//! Downloads and in-memory uploads go to a `TempDir` that lives as long as
//! the [`ResolvedInput`], so cleanup happens on drop even after an error.
//! Magic bytes are checked up front so callers get `NotAPdf` instead of an
//! opaque pdfium failure.

use crate::error::LensError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

pub enum ResolvedInput {
    Local(PathBuf),
    /// Downloaded or uploaded; the directory is removed on drop.
    Temporary { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temporary { path, .. } => path,
        }
    }

    /// File name without extension, used as the fallback title.
    pub fn stem(&self) -> String {
        self.path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "presentation".to_string())
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to a local PDF, downloading URLs.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, LensError> {
    if input.trim().is_empty() {
        return Err(LensError::InvalidInput {
            input: input.to_string(),
            reason: "no file or URL given".into(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Write an uploaded PDF to a temp file named after `file_name`.
pub async fn from_bytes(bytes: &[u8], file_name: &str) -> Result<ResolvedInput, LensError> {
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "upload.pdf".to_string());
    let temp_dir = TempDir::new().map_err(|e| LensError::Internal(e.to_string()))?;
    let path = temp_dir.path().join(name);

    check_magic(&path, bytes)?;
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| LensError::Internal(format!("Failed to write temp file: {e}")))?;
    debug!("Staged {} bytes at {}", bytes.len(), path.display());
    Ok(ResolvedInput::Temporary {
        path,
        _temp_dir: temp_dir,
    })
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, LensError> {
    let path = PathBuf::from(path_str);
    if !path.exists() {
        return Err(LensError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(LensError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LensError::PermissionDenied { path });
        }
        Err(_) => return Err(LensError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, LensError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| LensError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            LensError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let resolved = from_bytes(&bytes, &filename_from_url(url)).await?;
    info!("Downloaded to: {}", resolved.path().display());
    Ok(resolved)
}

fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
}

fn check_magic(path: &Path, bytes: &[u8]) -> Result<(), LensError> {
    if bytes.len() < 4 {
        return Err(LensError::InvalidInput {
            input: path.display().to_string(),
            reason: format!("only {} bytes, too short to be a PDF", bytes.len()),
        });
    }
    if &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(LensError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}
