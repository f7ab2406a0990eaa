//! Slide and presentation records.
//!
//! These are the values exchanged with every collaborator: ingestion produces
//! a [`Presentation`], the session mutates it slide by slide, and the
//! persistence gateway stores snapshots of it. Field names serialise in
//! camelCase so stored documents stay readable by other tools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Stable identifier of a slide, assigned at ingestion and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlideId(String);

impl SlideId {
    /// Identifier for page `page_number` of presentation `presentation_id`.
    pub fn for_page(presentation_id: &str, page_number: u32) -> Self {
        Self(format!("{presentation_id}-p{page_number}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SlideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SlideId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SlideId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Analysis state of one slide.
///
/// ```text
/// Idle ──▶ Loading ──▶ Success
///  ▲          │  ▲        │
///  │          ▼  │        │ regenerate
///  └──── Error ──┘◀───────┘
/// ```
///
/// There is no terminal state; any settled slide can be analysed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlideStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl SlideStatus {
    /// Whether the state machine permits `self → next`.
    pub fn can_transition_to(self, next: SlideStatus) -> bool {
        use SlideStatus::*;
        matches!(
            (self, next),
            (Idle, Loading) | (Error, Loading) | (Success, Loading) | (Loading, Success) | (Loading, Error)
        )
    }
}

impl fmt::Display for SlideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlideStatus::Idle => "IDLE",
            SlideStatus::Loading => "LOADING",
            SlideStatus::Success => "SUCCESS",
            SlideStatus::Error => "ERROR",
        })
    }
}

/// Who produced an explanation, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub user_id: String,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// One rasterised page plus its analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub id: SlideId,
    /// 1-based page number, immutable.
    pub page_number: u32,
    /// `data:` URI right after ingestion; a stored path or remote URL later.
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub status: SlideStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_by: Option<Attribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Slide {
    /// A fresh, never-analysed slide.
    pub fn new(id: SlideId, page_number: u32, image_url: impl Into<String>) -> Self {
        Self {
            id,
            page_number,
            image_url: image_url.into(),
            explanation: None,
            status: SlideStatus::Idle,
            custom_prompt: None,
            analyzed_by: None,
            last_error: None,
        }
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }
}

/// An ordered collection of slides plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub slide_count: usize,
    pub slides: Vec<Slide>,
}

impl Presentation {
    pub fn new(id: impl Into<String>, title: impl Into<String>, slides: Vec<Slide>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            folder_id: None,
            created_at: now,
            last_modified: now,
            slide_count: slides.len(),
            slides,
        }
    }

    pub fn slide(&self, id: &SlideId) -> Option<&Slide> {
        self.slides.iter().find(|s| &s.id == id)
    }

    pub fn slide_by_page(&self, page_number: u32) -> Option<&Slide> {
        self.slides.iter().find(|s| s.page_number == page_number)
    }

    /// The slide currently holding the analysis slot, if any.
    pub fn loading_slide(&self) -> Option<&Slide> {
        self.slides.iter().find(|s| s.status == SlideStatus::Loading)
    }

    /// Replace the slide with the same id, bumping `last_modified`.
    ///
    /// Returns `false` (and changes nothing) when no slide has that id.
    pub fn replace_slide(&mut self, slide: Slide) -> bool {
        match self.slides.iter_mut().find(|s| s.id == slide.id) {
            Some(existing) => {
                *existing = slide;
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Bump `last_modified`, never moving it backwards.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now().max(self.last_modified);
    }

    /// Check the ordering and uniqueness invariants of the slide sequence.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.slides.len());
        let mut prev_page = 0u32;
        for slide in &self.slides {
            if !seen.insert(&slide.id) {
                return Err(format!("duplicate slide id '{}'", slide.id));
            }
            if slide.page_number <= prev_page {
                return Err(format!(
                    "page {} of slide '{}' is out of order",
                    slide.page_number, slide.id
                ));
            }
            prev_page = slide.page_number;
        }
        if self.slide_count != self.slides.len() {
            return Err(format!(
                "slide_count is {} but {} slides are present",
                self.slide_count,
                self.slides.len()
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> PresentationSummary {
        PresentationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            folder_id: self.folder_id.clone(),
            last_modified: self.last_modified,
            slide_count: self.slide_count,
            analysed: self
                .slides
                .iter()
                .filter(|s| s.status == SlideStatus::Success)
                .count(),
        }
    }
}

/// Listing entry for a stored presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentationSummary {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub folder_id: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub slide_count: usize,
    pub analysed: usize,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A presentation with `n` idle slides and tiny placeholder images.
    pub fn deck(n: u32) -> Presentation {
        let slides = (1..=n)
            .map(|p| Slide::new(SlideId::for_page("deck", p), p, "data:image/png;base64,AAAA"))
            .collect();
        Presentation::new("deck", "Deck", slides)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::deck;
    use super::*;

    #[test]
    fn transition_table() {
        use SlideStatus::*;
        assert!(Idle.can_transition_to(Loading));
        assert!(Error.can_transition_to(Loading));
        assert!(Success.can_transition_to(Loading));
        assert!(Loading.can_transition_to(Success));
        assert!(Loading.can_transition_to(Error));

        assert!(!Idle.can_transition_to(Success));
        assert!(!Idle.can_transition_to(Error));
        assert!(!Loading.can_transition_to(Loading));
        assert!(!Loading.can_transition_to(Idle));
        assert!(!Success.can_transition_to(Error));
    }

    #[test]
    fn status_serialises_upper_case() {
        assert_eq!(serde_json::to_string(&SlideStatus::Loading).unwrap(), "\"LOADING\"");
        let s: SlideStatus = serde_json::from_str("\"SUCCESS\"").unwrap();
        assert_eq!(s, SlideStatus::Success);
    }

    #[test]
    fn slide_serialises_camel_case() {
        let slide = Slide::new(SlideId::from("d-p1"), 1, "data:,").with_custom_prompt("Explain");
        let json = serde_json::to_value(&slide).unwrap();
        assert_eq!(json["pageNumber"], 1);
        assert_eq!(json["customPrompt"], "Explain");
        assert_eq!(json["imageUrl"], "data:,");
        assert!(json.get("explanation").is_none());
    }

    #[test]
    fn replace_slide_touches_last_modified() {
        let mut p = deck(2);
        let before = p.last_modified;
        let mut s = p.slides[1].clone();
        s.explanation = Some("text".into());
        assert!(p.replace_slide(s));
        assert!(p.last_modified >= before);
        assert_eq!(p.slides[1].explanation.as_deref(), Some("text"));
    }

    #[test]
    fn replace_unknown_slide_is_rejected() {
        let mut p = deck(1);
        let stranger = Slide::new(SlideId::from("other-p9"), 9, "data:,");
        assert!(!p.replace_slide(stranger));
        assert_eq!(p.slides.len(), 1);
    }

    #[test]
    fn validate_catches_out_of_order_pages() {
        let mut p = deck(3);
        assert!(p.validate().is_ok());
        p.slides.swap(0, 2);
        assert!(p.validate().is_err());
    }

    #[test]
    fn summary_counts_analysed_slides() {
        let mut p = deck(3);
        p.slides[0].status = SlideStatus::Success;
        let s = p.summary();
        assert_eq!(s.slide_count, 3);
        assert_eq!(s.analysed, 1);
    }
}
