//! # lecturelens
//!
//! Page-by-page AI explanations for lecture slides.
//!
//! A PDF is rasterised into slides; a vision model explains each slide on
//! demand. An [`AnalysisSession`] decides when each call happens: it runs
//! slides one at a time in the order the user queued them, never sends the
//! same slide twice at once, and saves progress with a debounce so a burst of
//! changes costs one write.
//!
//! ## Flow
//!
//! ```text
//! PDF ──▶ ingest ──▶ Presentation (Idle slides)
//!                        │
//!                        ▼
//!               AnalysisSession ──▶ AnalysisClient   (one call at a time)
//!                  │        │
//!                  │        └──────▶ UsageTracker     (fire-and-forget)
//!                  ▼
//!            DebouncedSaver ──▶ PersistenceGateway   (last state of a burst)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lecturelens::{
//!     ingest, AnalysisSession, AnalyzerConfig, IngestConfig, JsonFileStore,
//!     NoopUsageTracker, SessionCollaborators, SessionConfig, VisionAnalyzer,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let presentation = ingest("lecture.pdf", &IngestConfig::default()).await?;
//!     let first = presentation.slides[0].id.clone();
//!
//!     let session = AnalysisSession::open(
//!         presentation,
//!         SessionCollaborators {
//!             // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!             analyzer: Arc::new(VisionAnalyzer::from_config(AnalyzerConfig::default())?),
//!             gateway: Arc::new(JsonFileStore::new("./lectures")),
//!             usage: Arc::new(NoopUsageTracker),
//!         },
//!         SessionConfig::default(),
//!     );
//!     session.enqueue(&first);
//!     session.wait_idle().await;
//!
//!     let done = session.close().await?;
//!     println!("{}", done.slides[0].explanation.as_deref().unwrap_or(""));
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `lecturelens` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod error;
pub mod events;
pub mod ingest;
pub mod model;
pub mod persist;
pub mod prompts;
pub mod session;
pub mod usage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{AnalysisClient, AnalysisOutput, AnalysisRequest, VisionAnalyzer};
pub use config::{Analyst, AnalyzerConfig, AnalyzerConfigBuilder, IngestConfig, SessionConfig, SessionConfigBuilder};
pub use error::{AnalysisError, LensError};
pub use events::{NoopObserver, SessionObserver};
pub use ingest::{ingest, ingest_bytes};
pub use model::{Attribution, Presentation, PresentationSummary, Slide, SlideId, SlideStatus};
pub use persist::{DebouncedSaver, JsonFileStore, PersistenceGateway};
pub use prompts::DEFAULT_ANALYSIS_PROMPT;
pub use session::{AnalysisSession, SessionCollaborators};
pub use usage::{NoopUsageTracker, UsageLog, UsageRecord, UsageTracker};
