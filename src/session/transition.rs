//! Slide state transitions.
//!
//! Every status change goes through one of the three functions here. Each
//! clones the slide, edits the copy and swaps it back in with
//! [`Presentation::replace_slide`], so the store only ever sees whole-slide
//! replacements and `last_modified` moves with every change.

use crate::error::{AnalysisError, LensError};
use crate::model::{Attribution, Presentation, Slide, SlideId, SlideStatus};

/// Move a settled slide to `Loading`.
///
/// Refused while any other slide is `Loading`: the presentation has a single
/// analysis slot.
pub fn begin(presentation: &mut Presentation, id: &SlideId) -> Result<Slide, LensError> {
    if let Some(loading) = presentation.loading_slide() {
        if &loading.id != id {
            return Err(LensError::AnalysisSlotBusy {
                requested: id.clone(),
                loading: loading.id.clone(),
            });
        }
    }
    advance(presentation, id, SlideStatus::Loading, |slide| {
        slide.last_error = None;
    })
}

/// Record a successful analysis.
///
/// `prompt_used` becomes the slide's custom prompt so a reload shows exactly
/// what produced the explanation.
pub fn succeed(
    presentation: &mut Presentation,
    id: &SlideId,
    explanation: String,
    prompt_used: String,
    analyzed_by: Attribution,
) -> Result<Slide, LensError> {
    advance(presentation, id, SlideStatus::Success, move |slide| {
        slide.explanation = Some(explanation);
        slide.custom_prompt = Some(prompt_used);
        slide.analyzed_by = Some(analyzed_by);
        slide.last_error = None;
    })
}

/// Record a failed analysis. The previous explanation, if any, is kept.
pub fn fail(
    presentation: &mut Presentation,
    id: &SlideId,
    error: &AnalysisError,
) -> Result<Slide, LensError> {
    let reason = error.to_string();
    advance(presentation, id, SlideStatus::Error, move |slide| {
        slide.last_error = Some(reason);
    })
}

fn advance(
    presentation: &mut Presentation,
    id: &SlideId,
    to: SlideStatus,
    edit: impl FnOnce(&mut Slide),
) -> Result<Slide, LensError> {
    let current = presentation
        .slide(id)
        .ok_or_else(|| LensError::SlideNotFound(id.clone()))?;
    if !current.status.can_transition_to(to) {
        return Err(LensError::InvalidTransition {
            slide: id.clone(),
            from: current.status,
            to,
        });
    }
    let mut next = current.clone();
    next.status = to;
    edit(&mut next);
    presentation.replace_slide(next.clone());
    Ok(next)
}
