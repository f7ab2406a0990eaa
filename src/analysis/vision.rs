//! Slide analysis through a vision-capable LLM.
//!
//! ## Retry Strategy
//!
//! Each attempt is bounded by `api_timeout_secs`. Failed or timed-out
//! attempts are retried up to `max_retries` times with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`). Only when every attempt failed does
//! the call return an error and the slide move to `Error`.

use super::provider::resolve_provider;
use super::tidy::tidy_explanation;
use super::{AnalysisClient, AnalysisOutput, AnalysisRequest};
use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, LensError};
use crate::ingest::encode::split_data_uri;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

pub struct VisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    config: AnalyzerConfig,
    http: reqwest::Client,
}

impl fmt::Debug for VisionAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionAnalyzer")
            .field("provider", &"<dyn LLMProvider>")
            .field("config", &self.config)
            .finish()
    }
}

impl VisionAnalyzer {
    /// Build an analyzer, resolving the provider from `config` and the environment.
    pub fn from_config(config: AnalyzerConfig) -> Result<Self, LensError> {
        let provider = resolve_provider(&config)?;
        Self::with_provider(provider, config)
    }

    pub fn with_provider(
        provider: Arc<dyn LLMProvider>,
        config: AnalyzerConfig,
    ) -> Result<Self, LensError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.image_fetch_timeout_secs))
            .build()
            .map_err(|e| LensError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            provider,
            config,
            http,
        })
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            ..Default::default()
        }
    }

    fn messages(&self, prompt: &str, image: ImageData) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompt.as_deref() {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user_with_images(prompt, vec![image]));
        messages
    }
}

/// Longest pause between two attempts.
const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry `attempt` (1-based): `base` doubled per attempt, capped.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF_MS)
}

#[async_trait]
impl AnalysisClient for VisionAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutput, AnalysisError> {
        let start = Instant::now();
        let image = load_image(&self.http, &request.image_url).await?;
        let messages = self.messages(&request.prompt, image);
        let options = self.options();
        let per_attempt = Duration::from_secs(self.config.api_timeout_secs);

        let mut last_err = String::new();
        let mut all_timed_out = true;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.config.retry_backoff_ms, attempt);
                warn!(
                    "Slide {}: retry {}/{} after {}ms",
                    request.slide_id, attempt, self.config.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match tokio::time::timeout(per_attempt, self.provider.chat(&messages, Some(&options))).await {
                Ok(Ok(response)) => {
                    let total_tokens = response.prompt_tokens as u64 + response.completion_tokens as u64;
                    debug!(
                        "Slide {}: {} input tokens, {} output tokens, {:?}",
                        request.slide_id,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(AnalysisOutput {
                        explanation: tidy_explanation(&response.content),
                        total_tokens,
                    });
                }
                Ok(Err(e)) => {
                    all_timed_out = false;
                    last_err = format!("{e}");
                    warn!("Slide {}: attempt {} failed: {}", request.slide_id, attempt + 1, last_err);
                }
                Err(_) => {
                    last_err = format!("no answer within {}s", self.config.api_timeout_secs);
                    warn!("Slide {}: attempt {} timed out", request.slide_id, attempt + 1);
                }
            }
        }

        if all_timed_out {
            Err(AnalysisError::Timeout {
                secs: self.config.api_timeout_secs,
            })
        } else {
            Err(AnalysisError::Provider {
                retries: self.config.max_retries,
                detail: last_err,
            })
        }
    }
}

/// Load a slide image for the provider.
///
/// Accepts a base64 `data:` URI (passed through), an http(s) URL (fetched)
/// or a local file path (read). Fetched and read bytes must decode as a
/// known image format.
pub async fn load_image(http: &reqwest::Client, image_url: &str) -> Result<ImageData, AnalysisError> {
    if image_url.starts_with("data:") {
        let (mime, payload) = split_data_uri(image_url).ok_or_else(|| AnalysisError::InvalidImage {
            detail: "malformed data URI".into(),
        })?;
        if payload.trim().is_empty() {
            return Err(AnalysisError::InvalidImage {
                detail: "data URI has no payload".into(),
            });
        }
        return Ok(ImageData::new(payload.trim().to_string(), mime).with_detail("high"));
    }

    let bytes = if image_url.starts_with("http://") || image_url.starts_with("https://") {
        fetch(http, image_url).await?
    } else {
        tokio::fs::read(image_url)
            .await
            .map_err(|e| AnalysisError::InvalidImage {
                detail: format!("{image_url}: {e}"),
            })?
    };

    let format = image::guess_format(&bytes).map_err(|e| AnalysisError::InvalidImage {
        detail: format!("{image_url}: {e}"),
    })?;
    debug!("Loaded {} ({} bytes)", image_url, bytes.len());
    Ok(ImageData::new(STANDARD.encode(&bytes), format.to_mime_type()).with_detail("high"))
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<Vec<u8>, AnalysisError> {
    let invalid = |detail: String| AnalysisError::InvalidImage { detail };
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| invalid(format!("{url}: {e}")))?;
    if !response.status().is_success() {
        return Err(invalid(format!("{url}: HTTP {}", response.status())));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| invalid(format!("{url}: {e}")))?;
    Ok(bytes.to_vec())
}
