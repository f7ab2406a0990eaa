//! Error types for the lecturelens library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LensError`]: the operation that returned it could not be carried out
//!   at all (bad input file, unknown slide, analysis slot taken, store not
//!   writable). Returned as `Err(LensError)`.
//!
//! * [`AnalysisError`]: a single analysis call failed (empty model output,
//!   unreadable image, provider error, timeout). It never escapes the session:
//!   it becomes the slide's `Error` status and `last_error` text so the slide
//!   can be retried later.

use crate::model::{SlideId, SlideStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by lecturelens operations.
///
/// Per-call analysis failures use [`AnalysisError`] and are recorded on the
/// slide rather than propagated here.
#[derive(Debug, Error)]
pub enum LensError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path, URL or identifier.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The document opened but has nothing to show.
    #[error("PDF '{path}' has no pages")]
    EmptyDocument { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install pdfium for your platform, or point PDFIUM_LIB_PATH at the\n\
directory containing libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Session errors ────────────────────────────────────────────────────
    /// The slide id is not part of the open presentation.
    #[error("Slide '{0}' does not exist in this presentation")]
    SlideNotFound(SlideId),

    /// The slide already has an analysis call running.
    #[error("Slide '{0}' is already being analysed")]
    AlreadyInFlight(SlideId),

    /// Another slide holds the single analysis slot.
    #[error("Cannot analyse '{requested}' while '{loading}' is still loading")]
    AnalysisSlotBusy { requested: SlideId, loading: SlideId },

    /// The slide state machine refused a transition.
    #[error("Slide '{slide}' cannot move from {from} to {to}")]
    InvalidTransition {
        slide: SlideId,
        from: SlideStatus,
        to: SlideStatus,
    },

    /// The session was closed before the operation completed.
    #[error("Analysis session is closed")]
    SessionClosed,

    // ── Store errors ──────────────────────────────────────────────────────
    /// No stored presentation with this id.
    #[error("Presentation '{id}' not found in store '{root}'")]
    PresentationNotFound { id: String, root: PathBuf },

    /// Reading or writing the store failed.
    #[error("Store I/O failed for '{path}': {source}")]
    StoreIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document could not be (de)serialised.
    #[error("Failed to (de)serialise '{path}': {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The persistence gateway rejected a snapshot.
    #[error("Saving presentation '{presentation}' failed: {detail}")]
    PersistFailed {
        presentation: String,
        detail: String,
    },

    // ── Usage errors ──────────────────────────────────────────────────────
    /// The usage tracker could not record a report.
    #[error("Usage report failed: {0}")]
    UsageReportFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one analysis call.
///
/// Stored as the slide's `last_error` when the slide moves to `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum AnalysisError {
    /// The model answered, but with nothing usable.
    #[error("model returned an empty explanation")]
    EmptyResponse,

    /// The slide image could not be loaded or decoded.
    #[error("slide image unusable: {detail}")]
    InvalidImage { detail: String },

    /// The provider call failed after retries.
    #[error("provider call failed after {retries} retries: {detail}")]
    Provider { retries: u32, detail: String },

    /// The provider call did not finish in time.
    #[error("provider call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The call was abandoned before it resolved.
    #[error("analysis interrupted before completion")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_busy_names_both_slides() {
        let e = LensError::AnalysisSlotBusy {
            requested: SlideId::from("deck-p2"),
            loading: SlideId::from("deck-p1"),
        };
        let msg = e.to_string();
        assert!(msg.contains("deck-p2"), "got: {msg}");
        assert!(msg.contains("deck-p1"), "got: {msg}");
    }

    #[test]
    fn invalid_transition_display() {
        let e = LensError::InvalidTransition {
            slide: SlideId::from("deck-p3"),
            from: SlideStatus::Idle,
            to: SlideStatus::Success,
        };
        assert_eq!(
            e.to_string(),
            "Slide 'deck-p3' cannot move from IDLE to SUCCESS"
        );
    }

    #[test]
    fn provider_error_display() {
        let e = AnalysisError::Provider {
            retries: 2,
            detail: "HTTP 503".into(),
        };
        assert!(e.to_string().contains("HTTP 503"));
        assert!(e.to_string().contains("2 retries"));
    }

    #[test]
    fn analysis_error_serialises() {
        let json = serde_json::to_string(&AnalysisError::Timeout { secs: 60 }).unwrap();
        let back: AnalysisError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AnalysisError::Timeout { secs: 60 });
    }
}
