/*!
 * Durable state of a run.
 *
 * - `manifest`: the chunk list, rewritten atomically after each terminal transition
 * - `artifacts`: prompts, raw responses and parsed entries, addressed by part and attempt
 */

pub mod artifacts;
pub mod manifest;

pub use artifacts::{ArtifactStore, FileArtifactStore};
pub use manifest::ChunkManifest;
