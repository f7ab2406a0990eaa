//! PDF rasterisation via pdfium.
//!
//! pdfium is a blocking C library, so all work runs inside
//! `tokio::task::spawn_blocking`. The document is opened once; metadata and
//! every page come out of the same pass.
//!
//! Page size is capped by the longest edge (`max_rendered_pixels`) rather
//! than by DPI, so an oversized poster page costs no more memory than a
//! normal slide.

use crate::error::LensError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything ingestion needs from a PDF.
pub struct RenderedDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    /// One image per page, in page order.
    pub pages: Vec<DynamicImage>,
}

/// Open the PDF at `pdf_path` and rasterise every page.
pub async fn render_document(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<RenderedDocument, LensError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);
    tokio::task::spawn_blocking(move || render_blocking(&path, max_pixels, password.as_deref()))
        .await
        .map_err(|e| LensError::Internal(format!("Render task panicked: {e}")))?
}

/// Bind to pdfium, from `PDFIUM_LIB_PATH` when set, else the system library.
fn bind_pdfium() -> Result<Pdfium, LensError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            debug!("Binding pdfium from {}", dir);
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| LensError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open_error(path: &Path, password: Option<&str>, err: PdfiumError) -> LensError {
    let detail = format!("{err:?}");
    let path: PathBuf = path.to_path_buf();
    if detail.to_ascii_lowercase().contains("password") {
        if password.is_some() {
            LensError::WrongPassword { path }
        } else {
            LensError::PasswordRequired { path }
        }
    } else {
        LensError::CorruptPdf { path, detail }
    }
}

fn render_blocking(
    pdf_path: &Path,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<RenderedDocument, LensError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let metadata = document.metadata();
    let tag = |kind: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(kind)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let title = tag(PdfDocumentMetadataTagType::Title);
    let author = tag(PdfDocumentMetadataTagType::Author);

    let pages = document.pages();
    let total = pages.len() as usize;
    if total == 0 {
        return Err(LensError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| LensError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            })?;
        let image = bitmap.as_image();
        debug!("Rendered page {} → {}x{} px", idx + 1, image.width(), image.height());
        images.push(image);
    }

    Ok(RenderedDocument {
        title,
        author,
        pages: images,
    })
}
