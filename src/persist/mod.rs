//! Where presentations are saved.
//!
//! The session never writes directly. It hands snapshots to a
//! [`DebouncedSaver`], which forwards the last one of each burst to a
//! [`PersistenceGateway`]. [`JsonFileStore`] is the gateway shipped with the
//! crate; anything that can store a whole document fits behind the trait.

mod debounce;
mod file;

pub use debounce::DebouncedSaver;
pub use file::JsonFileStore;

use crate::error::LensError;
use crate::model::Presentation;
use async_trait::async_trait;

/// Whole-document store for presentations.
///
/// `save` replaces the stored document with `presentation` as given; there
/// are no partial updates.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save(&self, presentation: &Presentation) -> Result<(), LensError>;
}
