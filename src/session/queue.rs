//! The user-controlled analysis queue.
//!
//! An ordered list of slide ids with no duplicates. It is view-session state
//! only and is never persisted.

use crate::model::{Presentation, SlideId, SlideStatus};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisQueue {
    entries: VecDeque<SlideId>,
}

impl AnalysisQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it is already queued. Returns whether it was added.
    pub fn push(&mut self, id: SlideId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.entries.push_back(id);
        true
    }

    /// Remove `id` wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, id: &SlideId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) -> bool {
        let had = !self.entries.is_empty();
        self.entries.clear();
        had
    }

    pub fn head(&self) -> Option<&SlideId> {
        self.entries.front()
    }

    pub fn contains(&self, id: &SlideId) -> bool {
        self.entries.iter().any(|e| e == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<SlideId> {
        self.entries.iter().cloned().collect()
    }

    /// Drop entries that point at no slide or at a slide that already
    /// succeeded. Returns how many entries were dropped.
    pub fn prune(&mut self, presentation: &Presentation) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id| {
            presentation
                .slide(id)
                .is_some_and(|s| s.status != SlideStatus::Success)
        });
        before - self.entries.len()
    }
}
