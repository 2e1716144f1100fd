/*!
 * Chunk records.
 *
 * A chunk is one segment of source transcript scheduled for independent
 * translation. Chunks are created by an upstream stage, mutated only by the
 * orchestrator, and never deleted: terminal states stay in the manifest so
 * that a later run can skip or retry them.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Processing state of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    Pending,
    Prompting,
    Translating,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Prompting => "prompting",
            Self::Translating => "translating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token counts reported by the backend for one successful invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptTokens {
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// Unit of translation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable, unique ordering key
    pub part_number: u32,

    #[serde(default)]
    pub status: ChunkStatus,

    /// Offset-adjusted source transcript for this chunk
    #[serde(default, alias = "adjusted_transcript_path")]
    pub source_transcript_path: Option<PathBuf>,

    /// Source-language timing track (SRT)
    #[serde(default)]
    pub reference_timing_path: Option<PathBuf>,

    #[serde(default)]
    pub prompt_path: Option<PathBuf>,

    /// Raw response of the latest attempt
    #[serde(default)]
    pub response_path: Option<PathBuf>,

    /// Set if and only if the chunk is completed
    #[serde(default)]
    pub parsed_data_path: Option<PathBuf>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub token_counts: Vec<AttemptTokens>,
}

impl Chunk {
    pub fn new(part_number: u32) -> Self {
        Self {
            part_number,
            status: ChunkStatus::Pending,
            source_transcript_path: None,
            reference_timing_path: None,
            prompt_path: None,
            response_path: None,
            parsed_data_path: None,
            error: None,
            token_counts: Vec::new(),
        }
    }

    pub fn with_transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_transcript_path = Some(path.into());
        self
    }

    pub fn with_reference(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_timing_path = Some(path.into());
        self
    }

    /// Forget everything a previous run produced
    pub fn reset(&mut self) {
        self.status = ChunkStatus::Pending;
        self.prompt_path = None;
        self.response_path = None;
        self.parsed_data_path = None;
        self.error = None;
        self.token_counts.clear();
    }

    /// Clear the output of an unfinished or failed run before processing again
    pub fn begin(&mut self) {
        self.parsed_data_path = None;
        self.error = None;
    }

    pub fn complete(&mut self, parsed_data_path: PathBuf) {
        self.status = ChunkStatus::Completed;
        self.parsed_data_path = Some(parsed_data_path);
        self.error = None;
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ChunkStatus::Failed;
        self.parsed_data_path = None;
        self.error = Some(error.into());
    }

    pub fn record_tokens(&mut self, attempt: u32, input_tokens: Option<u64>, output_tokens: Option<u64>) {
        self.token_counts.push(AttemptTokens {
            attempt,
            input_tokens,
            output_tokens,
        });
    }
}
