//! A directory of JSON documents.
//!
//! ```text
//! <root>/
//!   <presentation-id>.json        whole document, pretty-printed
//!   <presentation-id>/page-001.png
//!   <presentation-id>/page-002.png
//! ```
//!
//! Inline `data:` images are moved into the sibling directory on save and the
//! slide's `imageUrl` rewritten to the file path, so documents stay small
//! and images are written once. Documents are written to a temp file and
//! renamed into place, so a crash mid-write never leaves a truncated file.

use super::PersistenceGateway;
use crate::error::LensError;
use crate::ingest::encode::{decode_data_uri, extension_for, split_data_uri};
use crate::model::{Presentation, PresentationSummary};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a stored presentation.
    pub async fn load(&self, id: &str) -> Result<Presentation, LensError> {
        let path = self.document_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LensError::PresentationNotFound {
                    id: id.to_string(),
                    root: self.root.clone(),
                })
            }
            Err(source) => return Err(LensError::StoreIo { path, source }),
        };
        let presentation: Presentation = serde_json::from_slice(&bytes)
            .map_err(|source| LensError::Serialization {
                path: path.clone(),
                source,
            })?;
        if let Err(problem) = presentation.validate() {
            warn!("Stored presentation {} is inconsistent: {}", id, problem);
        }
        debug!("Loaded presentation {} from {}", id, path.display());
        Ok(presentation)
    }

    /// Summaries of every stored presentation, most recently modified first.
    ///
    /// With `folder` set, only presentations filed under that folder are
    /// listed. Unreadable documents are skipped with a warning.
    pub async fn list(&self, folder: Option<&str>) -> Result<Vec<PresentationSummary>, LensError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LensError::StoreIo {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut summaries = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => {
                    return Err(LensError::StoreIo {
                        path: self.root.clone(),
                        source,
                    })
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|b| {
                    serde_json::from_slice::<Presentation>(&b).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(p) if folder.is_none() || p.folder_id.as_deref() == folder => {
                    summaries.push(p.summary())
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable document {}: {}", path.display(), e),
            }
        }
        summaries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        Ok(summaries)
    }

    /// Remove a presentation and its images.
    pub async fn delete(&self, id: &str) -> Result<(), LensError> {
        let path = self.document_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(LensError::PresentationNotFound {
                    id: id.to_string(),
                    root: self.root.clone(),
                })
            }
            Err(source) => return Err(LensError::StoreIo { path, source }),
        }
        let images = self.root.join(id);
        match tokio::fs::remove_dir_all(&images).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(LensError::StoreIo { path: images, source }),
        }
        info!("Deleted presentation {}", id);
        Ok(())
    }

    fn document_path(&self, id: &str) -> Result<PathBuf, LensError> {
        validate_id(id)?;
        Ok(self.root.join(format!("{id}.json")))
    }

    /// Write inline images to disk and return a copy pointing at the files.
    async fn externalise_images(&self, presentation: &Presentation) -> Result<Presentation, LensError> {
        let mut stored = presentation.clone();
        let dir = self.root.join(&presentation.id);
        for slide in &mut stored.slides {
            if !slide.image_url.starts_with("data:") {
                continue;
            }
            let mime = split_data_uri(&slide.image_url)
                .map(|(mime, _)| mime)
                .unwrap_or_default();
            let path = dir.join(format!(
                "page-{:03}.{}",
                slide.page_number,
                extension_for(mime)
            ));
            // Images never change after ingestion; an existing file is final.
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                let (_, bytes) =
                    decode_data_uri(&slide.image_url).map_err(|detail| LensError::PersistFailed {
                        presentation: presentation.id.clone(),
                        detail: format!("slide {}: {}", slide.id, detail),
                    })?;
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|source| LensError::StoreIo {
                        path: dir.clone(),
                        source,
                    })?;
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|source| LensError::StoreIo {
                        path: path.clone(),
                        source,
                    })?;
                debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
            }
            slide.image_url = path.to_string_lossy().into_owned();
        }
        Ok(stored)
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn save(&self, presentation: &Presentation) -> Result<(), LensError> {
        let path = self.document_path(&presentation.id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| LensError::StoreIo {
                path: self.root.clone(),
                source,
            })?;

        let stored = self.externalise_images(presentation).await?;
        let json = serde_json::to_vec_pretty(&stored).map_err(|source| LensError::Serialization {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| LensError::StoreIo {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| LensError::StoreIo {
                path: path.clone(),
                source,
            })?;
        debug!("Wrote {} ({} bytes)", path.display(), json.len());
        Ok(())
    }
}

/// Ids become file names, so they must not be able to leave the root.
fn validate_id(id: &str) -> Result<(), LensError> {
    let ok = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(LensError::InvalidInput {
            input: id.to_string(),
            reason: "presentation ids may only contain letters, digits, '-', '_' and '.'".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::deck;
    use crate::model::SlideStatus;

    #[tokio::test]
    async fn save_then_load_round_trips_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut p = deck(2);
        p.slides[1].status = SlideStatus::Success;
        p.slides[1].explanation = Some("Explains recursion.".into());

        store.save(&p).await.unwrap();
        let back = store.load("deck").await.unwrap();

        assert_eq!(back.slides[1].status, SlideStatus::Success);
        assert_eq!(back.slides[1].explanation.as_deref(), Some("Explains recursion."));
        assert_eq!(back.slide_count, 2);
    }

    #[tokio::test]
    async fn inline_images_move_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save(&deck(1)).await.unwrap();

        let image = dir.path().join("deck").join("page-001.png");
        assert!(image.exists());
        let back = store.load("deck").await.unwrap();
        assert_eq!(back.slides[0].image_url, image.to_string_lossy());
    }

    #[tokio::test]
    async fn stored_images_are_not_decoded_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut p = deck(1);
        store.save(&p).await.unwrap();
        let image = dir.path().join("deck").join("page-001.png");
        let first = std::fs::read(&image).unwrap();

        // A payload that cannot be decoded proves the second save skips it.
        p.slides[0].image_url = "data:image/png;base64,@@@".into();
        store.save(&p).await.unwrap();

        assert_eq!(std::fs::read(&image).unwrap(), first);
        let back = store.load("deck").await.unwrap();
        assert_eq!(back.slides[0].image_url, image.to_string_lossy());
    }

    #[tokio::test]
    async fn undecodable_new_image_fails_the_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut p = deck(1);
        p.slides[0].image_url = "data:image/png;base64,@@@".into();
        assert!(matches!(
            store.save(&p).await,
            Err(LensError::PersistFailed { .. })
        ));
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.load("absent").await,
            Err(LensError::PresentationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let store = JsonFileStore::new("/tmp/unused");
        for id in ["../etc", "a/b", "", ".hidden"] {
            assert!(
                matches!(store.load(id).await, Err(LensError::InvalidInput { .. })),
                "{id:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save(&deck(1)).await.unwrap();
        assert!(!dir.path().join("deck.json.tmp").exists());
        assert!(dir.path().join("deck.json").exists());
    }
}
