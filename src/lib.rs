/*!
 * # dualsub - dual-language subtitles from transcript chunks
 *
 * A Rust library that turns long source-language transcripts into
 * dual-language subtitle entries with a large language model.
 *
 * ## Features
 *
 * - Per-chunk prompts built from a transcript and its reference timing track
 * - LLM backends:
 *   - Ollama (local LLM)
 *   - OpenAI API and OpenAI-compatible servers (LM Studio)
 *   - Anthropic API
 * - Tolerant parsing of partial or malformed model output
 * - Coverage and timing validation with validation-triggered regeneration
 * - Bounded concurrency over chunks, with exponential backoff per call
 * - Per-attempt artifacts and an incrementally saved manifest for resumable runs
 * - ISO 639-1 and ISO 639-2 language code support
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `chunk`: Chunk records and their states
 * - `subtitle`: Subtitle entries, timestamps and reference tracks
 * - `translation`: Chunk translation:
 *   - `translation::prompts`: Prompt templates and builder
 *   - `translation::parser`: Response parser
 *   - `translation::retry`: Backoff policy
 *   - `translation::orchestrator`: Per-chunk state machine and worker pool
 * - `validation`: Coverage and timing policy for parsed output
 * - `storage`: Chunk manifest and per-attempt artifacts
 * - `report`: Processing issues and the run report aggregator
 * - `providers`: Client implementations for various LLM providers:
 *   - `providers::ollama`: Ollama API client
 *   - `providers::openai`: OpenAI API client
 *   - `providers::anthropic`: Anthropic API client
 *   - `providers::mock`: Scripted provider for tests
 * - `file_utils`: File system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod chunk;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod report;
pub mod storage;
pub mod subtitle;
pub mod translation;
pub mod validation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use chunk::{Chunk, ChunkStatus};
pub use errors::{AppError, ChunkError, ProviderError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use providers::{create_backend, BackendResponse, LlmBackend};
pub use report::{ProcessingIssue, RunReport};
pub use storage::{ChunkManifest, FileArtifactStore};
pub use subtitle::SubtitleEntry;
pub use translation::ChunkOrchestrator;
