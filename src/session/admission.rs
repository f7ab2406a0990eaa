//! Background admission of queued slides.
//!
//! One task per session. It sleeps on the revision channel and, whenever
//! statuses or the queue change, decides whether the queue head may start:
//!
//! 1. any slide `Loading` → wait
//! 2. drop queue entries that are unknown or already `Success`
//! 3. head in flight → wait
//! 4. otherwise pause for `admission_delay`, re-check, and trigger the head
//!
//! The pause restarts from scratch if anything changes while it runs. The
//! head is only ever removed by success, by hand, or by the optional
//! failure cap.

use super::Shared;
use crate::error::LensError;
use crate::model::{SlideId, SlideStatus};
use std::sync::Arc;
use tracing::{debug, warn};

pub(super) async fn run(shared: Arc<Shared>) {
    let mut revisions = shared.revision.subscribe();
    let delay = shared.config.admission_delay();
    loop {
        revisions.borrow_and_update();
        let Some(candidate) = shared.next_admission() else {
            if revisions.changed().await.is_err() {
                break;
            }
            continue;
        };

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }
        if shared.next_admission().as_ref() != Some(&candidate) {
            continue;
        }

        debug!("Admitting slide {} from the queue", candidate);
        match shared.trigger(&candidate, None).await {
            Ok(SlideStatus::Error) => shared.note_queue_failure(&candidate),
            Ok(_) => {}
            Err(LensError::AlreadyInFlight(_)) | Err(LensError::AnalysisSlotBusy { .. }) => {
                debug!("Slide {} was started by hand first", candidate);
            }
            Err(e) => {
                warn!("Dropping slide {} from the queue: {}", candidate, e);
                shared.dequeue(&candidate);
            }
        }
    }
    debug!("Admission task stopped");
}

impl Shared {
    /// The slide admission would start next, if any may start now.
    fn next_admission(&self) -> Option<SlideId> {
        let (candidate, pruned) = {
            let mut guard = self.state();
            let st = &mut *guard;
            let pruned = (st.queue.prune(&st.presentation) > 0).then(|| st.queue.to_vec());
            let candidate = if st.presentation.loading_slide().is_some() {
                None
            } else {
                st.queue
                    .head()
                    .filter(|head| !st.in_flight.contains(*head))
                    .cloned()
            };
            (candidate, pruned)
        };
        if let Some(queue) = pruned {
            self.queue_changed(&queue);
        }
        candidate
    }

    /// Count a queue-driven failure and dequeue the slide once the
    /// configured cap is reached.
    fn note_queue_failure(&self, id: &SlideId) {
        let Some(cap) = self.config.max_auto_retries else {
            return;
        };
        let dropped = {
            let mut st = self.state();
            let failures = st.queue_failures.entry(id.clone()).or_insert(0);
            *failures += 1;
            if *failures < cap {
                debug!("Slide {} failed {}/{} queued attempts", id, failures, cap);
                None
            } else {
                st.queue_failures.remove(id);
                st.queue.remove(id).then(|| st.queue.to_vec())
            }
        };
        if let Some(queue) = dropped {
            warn!("Slide {} failed {} queued attempts in a row; removed from the queue", id, cap);
            self.queue_changed(&queue);
        }
    }
}
