//! Slide images as `data:` URIs.
//!
//! A freshly ingested slide carries its PNG inline so the presentation is
//! self-contained until a store decides where image bytes live. The vision
//! call needs the same thing split into MIME type and base64 payload.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rendered page as a PNG `data:` URI.
///
/// PNG over JPEG: slide text is thin strokes on flat colour, exactly what
/// JPEG artefacts smear.
pub fn encode_page(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let uri = format!("data:image/png;base64,{}", STANDARD.encode(&buf));
    debug!("Encoded {}x{} page → {} bytes", img.width(), img.height(), uri.len());
    Ok(uri)
}

/// Split a base64 `data:` URI into `(mime_type, payload)` without decoding.
///
/// Returns `None` for anything that is not a base64 data URI.
pub fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let mime = if mime.is_empty() { "application/octet-stream" } else { mime };
    Some((mime, payload))
}

/// Decode a base64 `data:` URI into `(mime_type, bytes)`.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), String> {
    let (mime, payload) =
        split_data_uri(uri).ok_or_else(|| "not a base64 data URI".to_string())?;
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {e}"))?;
    Ok((mime.to_string(), bytes))
}

/// File extension for an image MIME type.
pub fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encoded_page_decodes_back_to_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([0, 0, 255, 255])));
        let uri = encode_page(&img).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn split_rejects_plain_urls() {
        assert!(split_data_uri("https://example.com/a.png").is_none());
        assert!(split_data_uri("data:image/png,rawtext").is_none());
    }

    #[test]
    fn decode_reports_bad_base64() {
        let err = decode_data_uri("data:image/png;base64,@@@").unwrap_err();
        assert!(err.contains("base64"));
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }
}
