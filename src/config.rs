//! Configuration types.
//!
//! Three structs, one per moving part:
//!
//! * [`SessionConfig`]: queue admission, debounced saving, attribution.
//! * [`AnalyzerConfig`]: which vision model to call and how patiently.
//! * [`IngestConfig`]: how a PDF becomes slides.
//!
//! The first two are built through builders that validate on `build()`;
//! ingestion has few enough knobs that a plain struct with `Default` does.

use crate::error::LensError;
use crate::events::ObserverHandle;
use crate::prompts::DEFAULT_ANALYSIS_PROMPT;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The person analyses are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analyst {
    pub user_id: String,
    pub user_name: String,
}

impl Analyst {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }

    /// The local OS user, or a generic placeholder when it cannot be determined.
    pub fn local() -> Self {
        let name = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "local".to_string());
        Self::new(format!("local:{name}"), name)
    }
}

impl Default for Analyst {
    fn default() -> Self {
        Self::local()
    }
}

// ── Session ──────────────────────────────────────────────────────────────

/// Configuration for an [`crate::session::AnalysisSession`].
#[derive(Clone)]
pub struct SessionConfig {
    /// Pause before each queue-driven analysis call, in milliseconds. Default: 1000.
    ///
    /// A courtesy towards the provider's rate limit. The pause restarts
    /// whenever the queue or a slide changes while it is running.
    pub admission_delay_ms: u64,

    /// Trailing-edge debounce for snapshot writes, in milliseconds. Default: 1000.
    pub save_debounce_ms: u64,

    /// Cap on consecutive queue-driven failures of one slide. Default: `None`.
    ///
    /// With `None` a failing slide at the head of the queue is retried on
    /// every admission cycle until it succeeds or is removed by hand. With
    /// `Some(n)` it is dequeued after `n` consecutive failures.
    pub max_auto_retries: Option<u32>,

    /// Who successful analyses are attributed to.
    pub analyst: Analyst,

    /// Instruction used when neither the call nor the slide has a prompt.
    pub default_prompt: String,

    /// Receives status, queue and saving events.
    pub observer: Option<ObserverHandle>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            admission_delay_ms: 1000,
            save_debounce_ms: 1000,
            max_auto_retries: None,
            analyst: Analyst::default(),
            default_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
            observer: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("admission_delay_ms", &self.admission_delay_ms)
            .field("save_debounce_ms", &self.save_debounce_ms)
            .field("max_auto_retries", &self.max_auto_retries)
            .field("analyst", &self.analyst)
            .field("default_prompt_len", &self.default_prompt.len())
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SessionObserver>"))
            .finish()
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn admission_delay(&self) -> Duration {
        Duration::from_millis(self.admission_delay_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn admission_delay_ms(mut self, ms: u64) -> Self {
        self.config.admission_delay_ms = ms;
        self
    }

    pub fn save_debounce_ms(mut self, ms: u64) -> Self {
        self.config.save_debounce_ms = ms;
        self
    }

    pub fn max_auto_retries(mut self, n: Option<u32>) -> Self {
        self.config.max_auto_retries = n;
        self
    }

    pub fn analyst(mut self, analyst: Analyst) -> Self {
        self.config.analyst = analyst;
        self
    }

    pub fn default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.default_prompt = prompt.into();
        self
    }

    pub fn observer(mut self, observer: ObserverHandle) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SessionConfig, LensError> {
        let c = &self.config;
        if c.max_auto_retries == Some(0) {
            return Err(LensError::InvalidConfig(
                "max_auto_retries must be ≥ 1 when set".into(),
            ));
        }
        if c.default_prompt.trim().is_empty() {
            return Err(LensError::InvalidConfig("default prompt must not be blank".into()));
        }
        if c.analyst.user_id.is_empty() {
            return Err(LensError::InvalidConfig("analyst user id must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Analyzer ─────────────────────────────────────────────────────────────

/// Upper bound for [`AnalyzerConfig::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for [`crate::analysis::VisionAnalyzer`].
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses "gpt-4.1-nano".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate per slide. Default: 2048.
    pub max_tokens: usize,

    /// Transport-level retries on a failed provider call. Default: 2, at most [`MAX_RETRIES`].
    ///
    /// These happen inside one analysis call; the slide only moves to
    /// `Error` once they are exhausted.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-attempt provider timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Timeout for fetching a remote slide image, in seconds. Default: 30.
    pub image_fetch_timeout_secs: u64,

    /// Optional system message sent before the slide prompt.
    pub system_prompt: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 2048,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            image_fetch_timeout_secs: 30,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AnalyzerConfig {
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn image_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_fetch_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, LensError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(LensError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(LensError::InvalidConfig("api_timeout_secs must be ≥ 1".into()));
        }
        if c.max_retries > MAX_RETRIES {
            return Err(LensError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        Ok(self.config)
    }
}

// ── Ingestion ────────────────────────────────────────────────────────────

/// Configuration for [`crate::ingest::ingest`].
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Longest edge of a rendered slide image, in pixels. Default: 1600.
    ///
    /// Slides are mostly large type and diagrams; 1600 px keeps fine print
    /// legible while staying far below provider upload limits.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Prompt stamped onto every new slide. Default: the built-in instruction.
    pub default_prompt: String,

    /// Folder the new presentation is filed under.
    pub folder_id: Option<String>,

    /// Title override; otherwise the PDF title, then the file name.
    pub title: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_rendered_pixels: 1600,
            password: None,
            default_prompt: DEFAULT_ANALYSIS_PROMPT.to_string(),
            folder_id: None,
            title: None,
            download_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.admission_delay(), Duration::from_millis(1000));
        assert_eq!(c.save_debounce(), Duration::from_millis(1000));
        assert_eq!(c.max_auto_retries, None);
        assert!(c.observer.is_none());
    }

    #[test]
    fn zero_retry_cap_is_rejected() {
        let err = SessionConfig::builder()
            .max_auto_retries(Some(0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_auto_retries"));
    }

    #[test]
    fn blank_default_prompt_is_rejected() {
        assert!(SessionConfig::builder().default_prompt("  ").build().is_err());
    }

    #[test]
    fn builder_sets_fields() {
        let c = SessionConfig::builder()
            .admission_delay_ms(0)
            .save_debounce_ms(250)
            .max_auto_retries(Some(3))
            .analyst(Analyst::new("u1", "Ada"))
            .build()
            .unwrap();
        assert_eq!(c.admission_delay_ms, 0);
        assert_eq!(c.save_debounce_ms, 250);
        assert_eq!(c.max_auto_retries, Some(3));
        assert_eq!(c.analyst.user_name, "Ada");
    }

    #[test]
    fn analyzer_retry_count_is_bounded() {
        assert!(AnalyzerConfig::builder().max_retries(MAX_RETRIES).build().is_ok());
        let err = AnalyzerConfig::builder().max_retries(70).build().unwrap_err();
        assert!(matches!(err, LensError::InvalidConfig(_)));
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn analyzer_temperature_is_clamped() {
        let c = AnalyzerConfig::builder().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn analyzer_rejects_zero_timeout() {
        assert!(AnalyzerConfig::builder().api_timeout_secs(0).build().is_err());
    }
}
