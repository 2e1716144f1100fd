/*!
 * Error types for dualsub.
 *
 * Provider errors describe transport-level failures of an LLM client. They
 * never escape the backend adapter: `providers::ProviderBackend` logs them and
 * turns them into a failed invocation. Chunk errors are the terminal failure
 * kinds of a single chunk and each maps to exactly one issue type in the run
 * report.
 */

use thiserror::Error;

use crate::report::issues::{IssueType, ProcessingIssue};

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status into the matching variant
    pub fn from_status(status_code: u16, message: String) -> Self {
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Terminal failure of a single chunk
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChunkError {
    /// Required input missing or unreadable; never retried
    #[error("prompt generation failed: {0}")]
    PromptGen(String),

    /// Every backend invocation failed
    #[error("translation failed: {0}")]
    Translation(String),

    /// Parsed output kept failing validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// A result could not be persisted
    #[error("failed to persist result: {0}")]
    Format(String),
}

impl ChunkError {
    /// Issue category matching this failure
    pub fn issue_type(&self) -> IssueType {
        match self {
            Self::PromptGen(_) => IssueType::PromptGenError,
            Self::Translation(_) => IssueType::TranslationError,
            Self::Validation(_) => IssueType::ValidationError,
            Self::Format(_) => IssueType::FormatError,
        }
    }

    /// The terminal error-severity issue recorded for the failed chunk
    pub fn to_issue(&self, part: u32) -> ProcessingIssue {
        ProcessingIssue::error(self.issue_type(), self.to_string()).for_chunk(part)
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a chunk
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
