/*!
 * Validation of parsed chunk output.
 *
 * # Architecture
 *
 * - `coverage`: Compares entry ids with the reference track cues
 * - `timecodes`: Validates timing data integrity
 * - `service`: Applies the configured policy and decides whether an attempt is accepted
 */

pub mod coverage;
pub mod service;
pub mod timecodes;

// Re-export main types
pub use service::{ValidationConfig, ValidationInput, ValidationOutcome, Validator};
