/*!
 * Processing issues accumulated over a run.
 *
 * Issues are immutable records. They are created by the prompt builder,
 * parser, validator and orchestrator, travel to the aggregator as events,
 * and are only ever appended to the run report.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a processing issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    /// Required prompt input missing or unreadable
    PromptGenError,
    /// Backend invocation exhausted its retries
    TranslationError,
    /// Parsed output failed validation policy
    ValidationError,
    /// Result could not be persisted
    FormatError,
    /// A fragment of the model output could not be parsed
    ParseError,
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PromptGenError => "PromptGenError",
            Self::TranslationError => "TranslationError",
            Self::ValidationError => "ValidationError",
            Self::FormatError => "FormatError",
            Self::ParseError => "ParseError",
        };
        f.write_str(name)
    }
}

/// Severity of a processing issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks success
    Error,
    /// Informational; never blocks success
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// A single issue found while processing a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingIssue {
    /// Tagged category
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    /// Error or warning
    pub severity: Severity,
    /// Human readable description
    pub message: String,
    /// Chunk the issue belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_part: Option<u32>,
    /// Free-form context such as an offending line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ProcessingIssue {
    /// Create an error-severity issue
    pub fn error(issue_type: IssueType, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity: Severity::Error,
            message: message.into(),
            chunk_part: None,
            context: None,
        }
    }

    /// Create a warning-severity issue
    pub fn warning(issue_type: IssueType, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity: Severity::Warning,
            message: message.into(),
            chunk_part: None,
            context: None,
        }
    }

    /// Attach the owning chunk
    pub fn for_chunk(mut self, part: u32) -> Self {
        self.chunk_part = Some(part);
        self
    }

    /// Attach context, truncated to keep reports readable
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        let context = if context.chars().count() > 120 {
            let mut cut: String = context.chars().take(117).collect();
            cut.push_str("...");
            cut
        } else {
            context
        };
        self.context = Some(context);
        self
    }

    /// Same issue with a different severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ProcessingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.issue_type)?;
        if let Some(part) = self.chunk_part {
            write!(f, " (part {})", part)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(context) = &self.context {
            write!(f, " | {}", context)?;
        }
        Ok(())
    }
}

/// True if any issue in the slice has error severity
pub fn has_errors(issues: &[ProcessingIssue]) -> bool {
    issues.iter().any(ProcessingIssue::is_error)
}

/// Messages of all error-severity issues
pub fn error_messages(issues: &[ProcessingIssue]) -> Vec<String> {
    issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.message.clone())
        .collect()
}
