//! Observer trait for session events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::config::SessionConfigBuilder::observer`] to follow what the
//! session does: slide status changes, queue edits, the saving indicator and
//! failures that are otherwise only logged.
//!
//! A callback keeps the library ignorant of how the host displays things; a
//! terminal progress bar, a WebSocket or a test recorder all fit behind it.
//!
//! # Example
//!
//! ```rust
//! use lecturelens::{SessionObserver, SlideId, SlideStatus};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountSuccesses(AtomicUsize);
//!
//! impl SessionObserver for CountSuccesses {
//!     fn on_status_change(&self, _slide: &SlideId, _page: u32, status: SlideStatus) {
//!         if status == SlideStatus::Success {
//!             self.0.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::model::{SlideId, SlideStatus};
use std::sync::Arc;

/// Receives events from an [`crate::session::AnalysisSession`].
///
/// Methods may be called from any Tokio worker thread, but never while the
/// session holds its state lock, so implementations are free to call back
/// into the session. All methods default to no-ops.
pub trait SessionObserver: Send + Sync {
    /// A slide moved to `status`.
    fn on_status_change(&self, slide: &SlideId, page_number: u32, status: SlideStatus) {
        let _ = (slide, page_number, status);
    }

    /// An analysis call failed; `error` is the text stored on the slide.
    fn on_analysis_failed(&self, slide: &SlideId, page_number: u32, error: &str) {
        let _ = (slide, page_number, error);
    }

    /// The queue changed; `queue` is its new contents, head first.
    fn on_queue_changed(&self, queue: &[SlideId]) {
        let _ = queue;
    }

    /// The saving indicator flipped.
    fn on_saving_changed(&self, saving: bool) {
        let _ = saving;
    }

    /// A debounced write failed. In-memory state is kept as is.
    fn on_save_failed(&self, error: &str) {
        let _ = error;
    }
}

/// Observer that ignores every event. Used when none is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::SessionConfig`].
pub type ObserverHandle = Arc<dyn SessionObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tracking {
        changes: AtomicUsize,
        saves: AtomicUsize,
    }

    impl SessionObserver for Tracking {
        fn on_status_change(&self, _slide: &SlideId, _page: u32, _status: SlideStatus) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_saving_changed(&self, saving: bool) {
            if saving {
                self.saves.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        let id = SlideId::from("d-p1");
        o.on_status_change(&id, 1, SlideStatus::Loading);
        o.on_analysis_failed(&id, 1, "boom");
        o.on_queue_changed(&[id]);
        o.on_saving_changed(true);
        o.on_save_failed("disk full");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking {
            changes: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
        };
        let id = SlideId::from("d-p1");
        t.on_status_change(&id, 1, SlideStatus::Loading);
        t.on_status_change(&id, 1, SlideStatus::Success);
        t.on_saving_changed(true);
        t.on_saving_changed(false);
        assert_eq!(t.changes.load(Ordering::SeqCst), 2);
        assert_eq!(t.saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: ObserverHandle = Arc::new(NoopObserver);
        o.on_queue_changed(&[]);
    }
}
