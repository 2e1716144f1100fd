/*!
 * Timecode validation for subtitle entries.
 *
 * This module validates that timecodes are:
 * - Resolvable, from the entry itself or from its reference cue
 * - Logically consistent (start < end)
 * - Ordered by start time
 * - Non-overlapping between entries, within a tolerance
 */

use log::debug;

use crate::subtitle::{ReferenceTrack, SubtitleEntry, TimeRange};

/// Types of timecode issues
#[derive(Debug, Clone, PartialEq)]
pub enum TimecodeIssue {
    /// Start time is not before end time
    InvalidTimeRange {
        id: u32,
        start_ms: u64,
        end_ms: u64,
    },
    /// Starts before the preceding entry
    OutOfOrder {
        id: u32,
        prev_id: u32,
    },
    /// Overlaps with the preceding entry
    OverlapsWithEntry {
        id: u32,
        other_id: u32,
        overlap_ms: u64,
    },
    /// No explicit timing and no reference cue to borrow it from
    UnresolvedTiming {
        id: u32,
    },
}

impl TimecodeIssue {
    /// Whether the issue blocks acceptance under the strict policy
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::UnresolvedTiming { .. })
    }
}

impl std::fmt::Display for TimecodeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimecodeIssue::InvalidTimeRange { id, start_ms, end_ms } => {
                write!(f, "Entry {}: invalid time range, start {}ms >= end {}ms", id, start_ms, end_ms)
            }
            TimecodeIssue::OutOfOrder { id, prev_id } => {
                write!(f, "Entry {} starts before entry {}", id, prev_id)
            }
            TimecodeIssue::OverlapsWithEntry { id, other_id, overlap_ms } => {
                write!(f, "Entry {} overlaps with entry {} by {}ms", id, other_id, overlap_ms)
            }
            TimecodeIssue::UnresolvedTiming { id } => {
                write!(f, "Entry {} has no timing and no matching reference cue", id)
            }
        }
    }
}

/// Configuration for timecode validation
#[derive(Debug, Clone, Default)]
pub struct TimecodeValidatorConfig {
    /// Overlap or disorder below this many milliseconds is ignored
    pub tolerance_ms: u64,
}

/// Timecode validator for subtitle entries
pub struct TimecodeValidator {
    config: TimecodeValidatorConfig,
}

impl TimecodeValidator {
    /// Create a new validator with custom configuration
    pub fn with_config(config: TimecodeValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate entries in the order they were produced
    pub fn validate(&self, entries: &[SubtitleEntry], reference: Option<&ReferenceTrack>) -> Vec<TimecodeIssue> {
        let tolerance = self.config.tolerance_ms;
        let mut issues = Vec::new();
        let mut previous: Option<(u32, TimeRange)> = None;

        for entry in entries {
            let Some(timing) = entry.resolve_timing(reference) else {
                issues.push(TimecodeIssue::UnresolvedTiming { id: entry.original_id });
                continue;
            };

            if timing.end_ms <= timing.start_ms {
                issues.push(TimecodeIssue::InvalidTimeRange {
                    id: entry.original_id,
                    start_ms: timing.start_ms,
                    end_ms: timing.end_ms,
                });
                // Can't compare neighbours with an invalid range
                continue;
            }

            if let Some((prev_id, prev)) = previous {
                if timing.start_ms.saturating_add(tolerance) < prev.start_ms {
                    issues.push(TimecodeIssue::OutOfOrder {
                        id: entry.original_id,
                        prev_id,
                    });
                } else if prev.end_ms > timing.start_ms.saturating_add(tolerance) {
                    issues.push(TimecodeIssue::OverlapsWithEntry {
                        id: entry.original_id,
                        other_id: prev_id,
                        overlap_ms: prev.end_ms - timing.start_ms,
                    });
                }
            }

            previous = Some((entry.original_id, timing));
        }

        debug!("Timecode validation: {} entries, {} issues", entries.len(), issues.len());
        issues
    }
}
