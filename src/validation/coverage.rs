//! Reference coverage of parsed entries

use std::collections::BTreeSet;

use crate::subtitle::{ReferenceTrack, SubtitleEntry};

/// How well a set of entries covers the reference cues
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    /// Number of reference cues
    pub expected: usize,
    /// Reference cues that have an entry
    pub matched: usize,
    /// Reference cue ids without an entry, ascending
    pub missing: Vec<u32>,
    /// Entry ids that are not in the reference, ascending
    pub unknown: Vec<u32>,
}

impl CoverageReport {
    /// Share of reference cues covered; 1.0 for an empty reference
    pub fn ratio(&self) -> f64 {
        if self.expected == 0 {
            1.0
        } else {
            self.matched as f64 / self.expected as f64
        }
    }
}

pub fn check_coverage(entries: &[SubtitleEntry], reference: &ReferenceTrack) -> CoverageReport {
    let produced: BTreeSet<u32> = entries.iter().map(|e| e.original_id).collect();
    let expected: BTreeSet<u32> = reference.ids().into_iter().collect();

    CoverageReport {
        expected: expected.len(),
        matched: expected.intersection(&produced).count(),
        missing: expected.difference(&produced).copied().collect(),
        unknown: produced.difference(&expected).copied().collect(),
    }
}

/// Render an id list compactly, e.g. `3, 4, 9 (+12 more)`
pub fn summarize_ids(ids: &[u32], limit: usize) -> String {
    let shown: Vec<String> = ids.iter().take(limit).map(|id| id.to_string()).collect();
    if ids.len() > limit {
        format!("{} (+{} more)", shown.join(", "), ids.len() - limit)
    } else {
        shown.join(", ")
    }
}
