//! Slide analysis: one image plus one prompt in, one explanation out.
//!
//! The session only knows the [`AnalysisClient`] trait. [`VisionAnalyzer`]
//! implements it on top of an `edgequake-llm` vision provider; tests and
//! hosts with their own backends implement it directly.

mod provider;
mod tidy;
mod vision;

pub use provider::resolve_provider;
pub use tidy::tidy_explanation;
pub use vision::{load_image, VisionAnalyzer};

use crate::error::AnalysisError;
use crate::model::SlideId;
use async_trait::async_trait;

/// What to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub slide_id: SlideId,
    pub page_number: u32,
    /// `data:` URI, http(s) URL or local file path.
    pub image_url: String,
    /// The resolved instruction, never blank.
    pub prompt: String,
}

/// A completed analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutput {
    pub explanation: String,
    /// Prompt plus completion tokens, as billed by the provider.
    pub total_tokens: u64,
}

/// Turns a slide image and a prompt into an explanation.
///
/// Implementations do their own retrying; an `Err` is final for this call
/// and moves the slide to `Error`.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutput, AnalysisError>;
}
