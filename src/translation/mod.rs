/*!
 * Chunk translation.
 *
 * This module drives transcript chunks through a language model and turns
 * the output into validated dual-language subtitle entries. It is split into
 * several submodules:
 *
 * - `prompts`: Prompt templates and the per-chunk prompt builder
 * - `parser`: Tolerant parsing of model output
 * - `retry`: Backoff schedule for failed backend calls
 * - `orchestrator`: Per-chunk state machine and the bounded worker pool
 */

// Re-export main types for easier usage
pub use self::orchestrator::{Attempt, ChunkOrchestrator, RunSettings};
pub use self::parser::{ParseOutcome, ResponseParser};
pub use self::prompts::{BuiltPrompt, PromptBuilder, PromptTemplate};
pub use self::retry::RetryPolicy;

// Submodules
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod retry;
