//! Pending work queue

use std::collections::{HashSet, VecDeque};

use crate::variation::{Variation, VariationCollection};

/// Variations waiting to be handed out, best first
#[derive(Debug, Clone, Default)]
pub struct VariationQueue {
    entries: VecDeque<Variation>,
}

impl VariationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue holding `variations` in the given order
    pub fn from_variations(variations: VariationCollection) -> Self {
        Self {
            entries: variations.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the current contents in favor of a fresh extraction
    pub fn replace(&mut self, variations: VariationCollection) {
        self.entries = variations.into();
    }

    /// Take up to `count` entries from the front
    pub fn drain_batch(&mut self, count: usize) -> VariationCollection {
        let count = count.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    /// Number of drawn lines still queued
    pub fn draw_count(&self) -> usize {
        self.entries.iter().filter(|v| v.is_draw()).count()
    }

    /// Remove every entry a worker reported as resolved, returning how many went
    ///
    /// Entries match by move sequence only.
    pub fn remove_resolved(&mut self, resolved: &[Variation]) -> usize {
        if resolved.is_empty() {
            return 0;
        }
        let resolved: HashSet<&Variation> = resolved.iter().collect();
        let before = self.entries.len();
        self.entries.retain(|v| !resolved.contains(v));
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variation> {
        self.entries.iter()
    }
}
