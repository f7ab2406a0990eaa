//! The analysis session: queue admission, single-flight analysis and
//! debounced persistence for one open presentation.
//!
//! ## Guarantees
//!
//! * At most one slide of the presentation is `Loading` at any instant, so the
//!   vision provider never sees more than one request from a session.
//! * A slide is never sent twice at once: a per-slide in-flight set, checked
//!   and filled under the same lock as the status change, rejects a second
//!   trigger before the first resolves.
//! * Every status change is applied to the in-memory presentation first and
//!   then handed to the [`DebouncedSaver`], so the last state of a burst is
//!   the one that reaches the store.
//! * No slide stays `Loading` without a live call behind it. The in-flight
//!   guard settles the slide as `Error` if the call's future is dropped.
//!
//! ## Locking
//!
//! All state sits behind one `std::sync::Mutex` that is never held across an
//! `.await`. Observers and the saver are called after the lock is released.

mod admission;
pub mod queue;
pub mod transition;

use crate::analysis::{AnalysisClient, AnalysisOutput, AnalysisRequest};
use crate::config::SessionConfig;
use crate::error::{AnalysisError, LensError};
use crate::events::{NoopObserver, ObserverHandle};
use crate::model::{Attribution, Presentation, Slide, SlideId, SlideStatus};
use crate::persist::{DebouncedSaver, PersistenceGateway};
use crate::prompts::resolve_prompt;
use crate::usage::{UsageRecord, UsageTracker};
use chrono::Utc;
use queue::AnalysisQueue;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

/// The external services a session talks to.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub analyzer: Arc<dyn AnalysisClient>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub usage: Arc<dyn UsageTracker>,
}

/// Controller for one open presentation.
///
/// Must be created inside a Tokio runtime: opening spawns the admission task
/// and the save worker.
pub struct AnalysisSession {
    shared: Arc<Shared>,
    admission: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<SessionState>,
    /// Bumped after every change to statuses or the queue; admission and
    /// `wait_idle` sleep on it.
    revision: watch::Sender<u64>,
    analyzer: Arc<dyn AnalysisClient>,
    usage: Arc<dyn UsageTracker>,
    /// Usage reports still running; drained by `close`.
    usage_reports: Mutex<JoinSet<()>>,
    saver: DebouncedSaver,
    observer: ObserverHandle,
    config: SessionConfig,
}

struct SessionState {
    presentation: Presentation,
    queue: AnalysisQueue,
    in_flight: HashSet<SlideId>,
    /// Consecutive queue-driven failures per slide.
    queue_failures: HashMap<SlideId, u32>,
}

impl AnalysisSession {
    /// Open a session over `presentation`.
    ///
    /// Slides left `Loading` by an earlier session have no call behind them
    /// any more; they are moved to `Error` so they can be retried.
    pub fn open(
        mut presentation: Presentation,
        collaborators: SessionCollaborators,
        config: SessionConfig,
    ) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        let saver = DebouncedSaver::spawn(
            collaborators.gateway,
            config.save_debounce(),
            Arc::clone(&observer),
        );

        let stale: Vec<SlideId> = presentation
            .slides
            .iter()
            .filter(|s| s.status == SlideStatus::Loading)
            .map(|s| s.id.clone())
            .collect();
        for id in &stale {
            warn!("Slide {} was left loading by an earlier session; marking it failed", id);
            if let Err(e) = transition::fail(&mut presentation, id, &AnalysisError::Interrupted) {
                warn!("Could not recover slide {}: {}", id, e);
            }
        }
        if !stale.is_empty() {
            saver.schedule(presentation.clone());
        }

        info!(
            "Opened presentation '{}' ({} slides)",
            presentation.title, presentation.slide_count
        );

        let (revision, _) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState {
                presentation,
                queue: AnalysisQueue::new(),
                in_flight: HashSet::new(),
                queue_failures: HashMap::new(),
            }),
            revision,
            analyzer: collaborators.analyzer,
            usage: collaborators.usage,
            usage_reports: Mutex::new(JoinSet::new()),
            saver,
            observer,
            config,
        });
        let admission = tokio::spawn(admission::run(Arc::clone(&shared)));

        Self {
            shared,
            admission: Some(admission),
        }
    }

    // ── Queue ────────────────────────────────────────────────────────────

    /// Add a slide to the back of the queue.
    ///
    /// No-op (returns `false`) if the slide is unknown, already queued or
    /// already analysed. Never starts an analysis by itself.
    pub fn enqueue(&self, id: &SlideId) -> bool {
        self.shared.enqueue(id)
    }

    /// Remove a slide from the queue. A call already running is not aborted.
    pub fn dequeue(&self, id: &SlideId) -> bool {
        self.shared.dequeue(id)
    }

    pub fn clear_queue(&self) {
        let cleared = {
            let mut st = self.shared.state();
            st.queue_failures.clear();
            st.queue.clear()
        };
        if cleared {
            debug!("Queue cleared");
            self.shared.queue_changed(&[]);
        }
    }

    /// Queue contents, head first.
    pub fn queue(&self) -> Vec<SlideId> {
        self.shared.state().queue.to_vec()
    }

    // ── Analysis ─────────────────────────────────────────────────────────

    /// Analyse one slide now, bypassing the queue.
    ///
    /// The prompt is `prompt_override`, else the slide's custom prompt, else
    /// the configured default. Returns the slide's settled status: a failed
    /// call is `Ok(SlideStatus::Error)`, not an `Err`.
    ///
    /// # Errors
    /// * [`LensError::SlideNotFound`]: unknown id
    /// * [`LensError::AlreadyInFlight`]: this slide's previous call is still running
    /// * [`LensError::AnalysisSlotBusy`]: another slide is loading
    pub async fn trigger_analysis(
        &self,
        id: &SlideId,
        prompt_override: Option<String>,
    ) -> Result<SlideStatus, LensError> {
        self.shared.trigger(id, prompt_override).await
    }

    /// Like [`Self::trigger_analysis`] but runs on its own task.
    pub fn spawn_analysis(
        &self,
        id: SlideId,
        prompt_override: Option<String>,
    ) -> JoinHandle<Result<SlideStatus, LensError>> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.trigger(&id, prompt_override).await })
    }

    /// Replace the slide's custom prompt. `None` or a blank string clears it.
    pub fn set_custom_prompt(&self, id: &SlideId, prompt: Option<String>) -> Result<(), LensError> {
        let prompt = prompt.filter(|p| !p.trim().is_empty());
        let snapshot = {
            let mut st = self.shared.state();
            let mut slide = st
                .presentation
                .slide(id)
                .cloned()
                .ok_or_else(|| LensError::SlideNotFound(id.clone()))?;
            slide.custom_prompt = prompt;
            st.presentation.replace_slide(slide);
            st.presentation.clone()
        };
        self.shared.saver.schedule(snapshot);
        self.shared.bump();
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn slide(&self, id: &SlideId) -> Option<Slide> {
        self.shared.state().presentation.slide(id).cloned()
    }

    pub fn slide_by_page(&self, page_number: u32) -> Option<Slide> {
        self.shared
            .state()
            .presentation
            .slide_by_page(page_number)
            .cloned()
    }

    /// A copy of the current in-memory presentation.
    pub fn snapshot(&self) -> Presentation {
        self.shared.state().presentation.clone()
    }

    /// Whether the queue is empty and no call is running.
    pub fn is_idle(&self) -> bool {
        self.shared.is_idle()
    }

    /// Resolve once [`Self::is_idle`] holds.
    ///
    /// Without `max_auto_retries` a slide that keeps failing at the head of
    /// the queue is retried forever, and this never resolves on its own.
    pub async fn wait_idle(&self) {
        let mut revisions = self.shared.revision.subscribe();
        loop {
            revisions.borrow_and_update();
            if self.shared.is_idle() {
                return;
            }
            if revisions.changed().await.is_err() {
                return;
            }
        }
    }

    // ── Persistence ──────────────────────────────────────────────────────

    /// Whether a write is pending or in flight.
    pub fn is_saving(&self) -> bool {
        self.shared.saver.is_saving()
    }

    /// The saving indicator as a stream, starting with its current value.
    pub fn saving_updates(&self) -> WatchStream<bool> {
        WatchStream::new(self.shared.saver.subscribe())
    }

    /// Write the pending snapshot now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<(), LensError> {
        self.shared.saver.flush().await
    }

    /// Stop admitting queued slides, flush, wait for pending usage reports,
    /// and return the final state.
    ///
    /// A queue-driven call that is still running is abandoned and its slide
    /// marked failed; manual calls started with [`Self::spawn_analysis`] keep
    /// running on their own tasks.
    pub async fn close(mut self) -> Result<Presentation, LensError> {
        if let Some(handle) = self.admission.take() {
            handle.abort();
            let _ = handle.await;
        }
        let flushed = self.shared.saver.flush().await;
        let mut reports = {
            let mut pending = self.shared.usage_reports();
            std::mem::take(&mut *pending)
        };
        while let Some(joined) = reports.join_next().await {
            if let Err(e) = joined {
                warn!("Usage report task failed: {}", e);
            }
        }
        flushed?;
        let snapshot = self.snapshot();
        info!("Closed presentation '{}'", snapshot.title);
        Ok(snapshot)
    }
}

impl Drop for AnalysisSession {
    fn drop(&mut self) {
        if let Some(handle) = self.admission.take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn usage_reports(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.usage_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    fn queue_changed(&self, queue: &[SlideId]) {
        self.bump();
        self.observer.on_queue_changed(queue);
    }

    fn is_idle(&self) -> bool {
        let st = self.state();
        st.queue.is_empty() && st.in_flight.is_empty() && st.presentation.loading_slide().is_none()
    }

    fn enqueue(&self, id: &SlideId) -> bool {
        let queue = {
            let mut st = self.state();
            let eligible = st
                .presentation
                .slide(id)
                .is_some_and(|s| s.status != SlideStatus::Success);
            if !eligible || !st.queue.push(id.clone()) {
                return false;
            }
            st.queue_failures.remove(id);
            st.queue.to_vec()
        };
        debug!("Queued slide {} ({} in queue)", id, queue.len());
        self.queue_changed(&queue);
        true
    }

    fn dequeue(&self, id: &SlideId) -> bool {
        let queue = {
            let mut st = self.state();
            st.queue_failures.remove(id);
            if !st.queue.remove(id) {
                return false;
            }
            st.queue.to_vec()
        };
        debug!("Removed slide {} from the queue", id);
        self.queue_changed(&queue);
        true
    }

    async fn trigger(
        &self,
        id: &SlideId,
        prompt_override: Option<String>,
    ) -> Result<SlideStatus, LensError> {
        let (request, snapshot) = {
            let mut st = self.state();
            let slide = st
                .presentation
                .slide(id)
                .ok_or_else(|| LensError::SlideNotFound(id.clone()))?;
            if st.in_flight.contains(id) {
                return Err(LensError::AlreadyInFlight(id.clone()));
            }
            let request = AnalysisRequest {
                slide_id: id.clone(),
                page_number: slide.page_number,
                image_url: slide.image_url.clone(),
                prompt: resolve_prompt(
                    prompt_override.as_deref(),
                    slide.custom_prompt.as_deref(),
                    &self.config.default_prompt,
                )
                .to_string(),
            };
            transition::begin(&mut st.presentation, id)?;
            st.in_flight.insert(id.clone());
            (request, st.presentation.clone())
        };
        let guard = InFlightGuard {
            shared: self,
            id,
            settled: false,
        };

        self.saver.schedule(snapshot);
        self.bump();
        self.observer
            .on_status_change(id, request.page_number, SlideStatus::Loading);
        info!("Analysing slide {} (page {})", id, request.page_number);

        let outcome = match self.analyzer.analyze(&request).await {
            Ok(output) if output.explanation.trim().is_empty() => Err(AnalysisError::EmptyResponse),
            other => other,
        };
        guard.settle(outcome, request)
    }

    /// Apply the result of a call, release the in-flight slot and report.
    fn finish(
        &self,
        id: &SlideId,
        outcome: Result<AnalysisOutput, AnalysisError>,
        request: Option<AnalysisRequest>,
    ) -> Result<SlideStatus, LensError> {
        let mut usage = None;
        let mut failure = None;
        let (applied, snapshot, queue) = {
            let mut st = self.state();
            st.in_flight.remove(id);
            let applied = match (outcome, request) {
                (Ok(output), Some(request)) => {
                    let analyst = &self.config.analyst;
                    usage = Some(UsageRecord {
                        timestamp: Utc::now(),
                        user_id: analyst.user_id.clone(),
                        user_name: analyst.user_name.clone(),
                        presentation_id: st.presentation.id.clone(),
                        slide_id: id.clone(),
                        page_number: request.page_number,
                        total_tokens: output.total_tokens,
                    });
                    let by = Attribution {
                        user_id: analyst.user_id.clone(),
                        user_name: analyst.user_name.clone(),
                        timestamp: Utc::now(),
                    };
                    transition::succeed(
                        &mut st.presentation,
                        id,
                        output.explanation,
                        request.prompt,
                        by,
                    )
                }
                (Ok(_), None) => transition::fail(&mut st.presentation, id, &AnalysisError::Interrupted),
                (Err(e), _) => {
                    failure = Some(e.to_string());
                    transition::fail(&mut st.presentation, id, &e)
                }
            };
            let queue = match &applied {
                Ok(slide) if slide.status == SlideStatus::Success => {
                    st.queue_failures.remove(id);
                    st.queue.remove(id).then(|| st.queue.to_vec())
                }
                _ => None,
            };
            (applied, st.presentation.clone(), queue)
        };

        let slide = match applied {
            Ok(slide) => slide,
            Err(e) => {
                warn!("Could not record analysis result for slide {}: {}", id, e);
                self.bump();
                return Err(e);
            }
        };

        self.saver.schedule(snapshot);
        self.bump();
        if let Some(queue) = queue {
            self.observer.on_queue_changed(&queue);
        }
        self.observer
            .on_status_change(id, slide.page_number, slide.status);
        match failure {
            Some(reason) => {
                warn!("Slide {} (page {}) failed: {}", id, slide.page_number, reason);
                self.observer
                    .on_analysis_failed(id, slide.page_number, &reason);
            }
            None => info!("Slide {} (page {}) analysed", id, slide.page_number),
        }
        if let Some(record) = usage {
            self.report_usage(record);
        }
        Ok(slide.status)
    }

    /// Fire-and-forget for the slide: a failed report is logged and
    /// otherwise ignored. The task is tracked so `close` can wait for it.
    fn report_usage(&self, record: UsageRecord) {
        let usage = Arc::clone(&self.usage);
        let mut reports = self.usage_reports();
        while reports.try_join_next().is_some() {}
        reports.spawn(async move {
            if let Err(e) = usage.record(&record).await {
                warn!(
                    "Usage report for slide {} ({} tokens) failed: {}",
                    record.slide_id, record.total_tokens, e
                );
            }
        });
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // A session dropped without `close` leaves its reports running.
        self.usage_reports
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .detach_all();
    }
}

/// Holds a slide's in-flight slot for the duration of one call.
///
/// Dropping it unsettled (the call's future was cancelled) marks the slide
/// failed and frees the slot.
struct InFlightGuard<'a> {
    shared: &'a Shared,
    id: &'a SlideId,
    settled: bool,
}

impl InFlightGuard<'_> {
    fn settle(
        mut self,
        outcome: Result<AnalysisOutput, AnalysisError>,
        request: AnalysisRequest,
    ) -> Result<SlideStatus, LensError> {
        self.settled = true;
        self.shared.finish(self.id, outcome, Some(request))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Analysis of slide {} abandoned before completion", self.id);
            let _ = self
                .shared
                .finish(self.id, Err(AnalysisError::Interrupted), None);
        }
    }
}
