/*!
 * Prompt construction for chunk translation.
 *
 * This module provides:
 * - The default dual-language subtitle template
 * - `PromptBuilder`, which fills a template from a chunk's transcript and reference track
 */

pub mod templates;

// Re-export main types
pub use templates::{BuiltPrompt, PromptBuilder, PromptTemplate, NO_REFERENCE_PLACEHOLDER};
