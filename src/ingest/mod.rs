//! PDF ingestion: a file, URL or upload becomes a [`Presentation`] of
//! `Idle` slides.
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ Presentation
//! (path/URL) (pdfium)  (PNG data URI)
//! ```
//!
//! Nothing is analysed here. Every slide starts `Idle` with the configured
//! default prompt as its custom prompt, so the prompt shown next to a fresh
//! slide is the one that will be used.

pub mod encode;
pub mod input;
pub mod render;

use crate::config::IngestConfig;
use crate::error::LensError;
use crate::model::{Presentation, Slide, SlideId};
use chrono::Utc;
use input::ResolvedInput;
use tracing::info;

/// Ingest a local PDF or an http(s) URL.
pub async fn ingest(input: &str, config: &IngestConfig) -> Result<Presentation, LensError> {
    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    build(&resolved, config).await
}

/// Ingest an uploaded PDF held in memory.
pub async fn ingest_bytes(
    bytes: &[u8],
    file_name: &str,
    config: &IngestConfig,
) -> Result<Presentation, LensError> {
    let resolved = input::from_bytes(bytes, file_name).await?;
    build(&resolved, config).await
}

async fn build(resolved: &ResolvedInput, config: &IngestConfig) -> Result<Presentation, LensError> {
    let document = render::render_document(
        resolved.path(),
        config.max_rendered_pixels,
        config.password.as_deref(),
    )
    .await?;

    let stem = resolved.stem();
    let id = presentation_id(&stem, Utc::now().timestamp_millis());
    let mut slides = Vec::with_capacity(document.pages.len());
    for (idx, page) in document.pages.iter().enumerate() {
        let page_number = idx as u32 + 1;
        let image_url = encode::encode_page(page).map_err(|e| LensError::RasterisationFailed {
            page: idx + 1,
            detail: format!("PNG encoding failed: {e}"),
        })?;
        slides.push(
            Slide::new(SlideId::for_page(&id, page_number), page_number, image_url)
                .with_custom_prompt(config.default_prompt.clone()),
        );
    }

    let title = config
        .title
        .clone()
        .or(document.title)
        .unwrap_or(stem);
    let mut presentation = Presentation::new(id, title, slides);
    presentation.author = document.author;
    presentation.folder_id = config.folder_id.clone();

    info!(
        "Ingested '{}' as {} ({} slides)",
        presentation.title, presentation.id, presentation.slide_count
    );
    Ok(presentation)
}

/// `<slug>-<millis in hex>`: readable, unique per ingestion, safe as a file name.
fn presentation_id(stem: &str, millis: i64) -> String {
    let mut slug = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    let slug: String = slug.chars().take(40).collect();
    let slug = if slug.is_empty() { "presentation".to_string() } else { slug };
    format!("{slug}-{millis:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_slugged() {
        assert_eq!(presentation_id("Week 3: Recursion!", 255), "week-3-recursion-ff");
        assert_eq!(presentation_id("  ", 16), "presentation-10");
        assert_eq!(presentation_id("Ünïcode", 1), "n-code-1");
    }

    #[test]
    fn long_names_are_capped() {
        let id = presentation_id(&"a".repeat(100), 0);
        assert_eq!(id, format!("{}-0", "a".repeat(40)));
    }

    #[tokio::test]
    async fn non_pdf_upload_is_rejected_before_rendering() {
        let err = ingest_bytes(b"GIF89a....", "slides.pdf", &IngestConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LensError::NotAPdf { .. }));
    }
}
