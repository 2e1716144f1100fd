/*!
 * Validation service that applies the configured policy.
 *
 * The service decides whether a parsed attempt is accepted. Error-severity
 * issues reject the attempt; warnings are informational. For the last chunk
 * of a run on its final attempt, a relaxed policy may downgrade coverage and
 * timing errors to warnings, since the tail of a transcript is often cut.
 */

use log::debug;
use serde::{Deserialize, Serialize};

use crate::report::issues::{has_errors, IssueType, ProcessingIssue, Severity};
use crate::subtitle::{ReferenceTrack, SubtitleEntry};

use super::coverage::{check_coverage, summarize_ids};
use super::timecodes::{TimecodeValidator, TimecodeValidatorConfig};

/// Configuration for the validation service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Whether to validate timing integrity
    #[serde(default = "default_true")]
    pub timing_check: bool,

    /// Overlap or disorder tolerated between neighbouring entries
    #[serde(default = "default_timing_tolerance_ms")]
    pub timing_tolerance_ms: u64,

    /// Reference cues that may lack an entry before coverage is an error
    #[serde(default)]
    pub max_missing_entries: usize,

    /// Relax the policy for the last chunk on its final attempt
    #[serde(default = "default_true")]
    pub relax_tail: bool,

    /// Minimum coverage ratio still accepted under the relaxed policy
    #[serde(default = "default_tail_min_coverage")]
    pub tail_min_coverage: f64,

    /// Downgrade timing errors under the relaxed policy
    #[serde(default = "default_true")]
    pub tail_relax_timing: bool,
}

fn default_true() -> bool {
    true
}

fn default_timing_tolerance_ms() -> u64 {
    100
}

fn default_tail_min_coverage() -> f64 {
    0.8
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            timing_check: true,
            timing_tolerance_ms: default_timing_tolerance_ms(),
            max_missing_entries: 0,
            relax_tail: true,
            tail_min_coverage: default_tail_min_coverage(),
            tail_relax_timing: true,
        }
    }
}

/// Everything the validator looks at for one attempt
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub entries: &'a [SubtitleEntry],
    /// Issues the parser raised for the same response
    pub parsing_issues: &'a [ProcessingIssue],
    pub reference: Option<&'a ReferenceTrack>,
    pub part: u32,
    pub is_last_chunk: bool,
    pub is_final_attempt: bool,
}

/// Verdict on one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub issues: Vec<ProcessingIssue>,
}

impl ValidationOutcome {
    pub fn errors(&self) -> impl Iterator<Item = &ProcessingIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ProcessingIssue> {
        self.issues.iter().filter(|i| !i.is_error())
    }
}

/// Validator for parsed chunk output
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
    target_language: String,
}

impl Validator {
    pub fn new(config: ValidationConfig, target_language: impl Into<String>) -> Self {
        Self {
            config,
            target_language: target_language.into(),
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationOutcome {
        let part = input.part;
        let relaxed = self.config.relax_tail && input.is_last_chunk && input.is_final_attempt;
        let issue = |severity: Severity, message: String| {
            ProcessingIssue::error(IssueType::ValidationError, message)
                .with_severity(severity)
                .for_chunk(part)
        };

        if input.entries.is_empty() {
            let rejected = input
                .parsing_issues
                .iter()
                .filter(|i| i.issue_type == IssueType::ParseError)
                .count();
            return ValidationOutcome {
                is_valid: false,
                issues: vec![issue(
                    Severity::Error,
                    format!("No subtitle entries parsed ({} fragments rejected)", rejected),
                )],
            };
        }

        let mut issues = Vec::new();
        let mut relaxed_checks = Vec::new();

        for entry in input.entries {
            if !entry.has_any_text() {
                issues.push(issue(Severity::Error, format!("Entry {} has no text", entry.original_id)));
            } else if entry.text(&self.target_language).is_none() {
                issues.push(issue(
                    Severity::Warning,
                    format!("Entry {} has no '{}' text", entry.original_id, self.target_language),
                ));
            }
        }

        match input.reference.filter(|r| !r.is_empty()) {
            None => {
                issues.push(issue(Severity::Warning, "No reference track; coverage not checked".to_string()));
            }
            Some(reference) => {
                let coverage = check_coverage(input.entries, reference);
                if !coverage.missing.is_empty() {
                    let message = format!(
                        "{} of {} reference cues have no entry: {}",
                        coverage.missing.len(),
                        coverage.expected,
                        summarize_ids(&coverage.missing, 10)
                    );
                    let severity = if coverage.missing.len() <= self.config.max_missing_entries {
                        Severity::Warning
                    } else if relaxed && coverage.ratio() >= self.config.tail_min_coverage {
                        relaxed_checks.push("coverage");
                        Severity::Warning
                    } else {
                        Severity::Error
                    };
                    issues.push(issue(severity, message));
                }
                if !coverage.unknown.is_empty() {
                    issues.push(issue(
                        Severity::Warning,
                        format!("Entries not in the reference track: {}", summarize_ids(&coverage.unknown, 10)),
                    ));
                }
            }
        }

        if self.config.timing_check {
            let timecodes = TimecodeValidator::with_config(TimecodeValidatorConfig {
                tolerance_ms: self.config.timing_tolerance_ms,
            });
            let timing_issues = timecodes.validate(input.entries, input.reference);
            let relax_timing = relaxed && self.config.tail_relax_timing;
            if relax_timing && timing_issues.iter().any(|t| t.is_error()) {
                relaxed_checks.push("timing");
            }
            for timing_issue in timing_issues {
                let severity = if timing_issue.is_error() && !relax_timing {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                issues.push(issue(severity, timing_issue.to_string()));
            }
        }

        if !relaxed_checks.is_empty() {
            issues.push(issue(
                Severity::Warning,
                format!("Relaxed tail policy applied to {} checks", relaxed_checks.join(" and ")),
            ));
        }

        let is_valid = !has_errors(&issues);
        debug!(
            "Part {}: validation {} ({} entries, {} issues)",
            part,
            if is_valid { "passed" } else { "failed" },
            input.entries.len(),
            issues.len()
        );

        ValidationOutcome { is_valid, issues }
    }
}
