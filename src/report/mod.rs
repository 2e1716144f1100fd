/*!
 * Run reporting.
 *
 * Chunk tasks never share mutable report state. They send `RunEvent`s to a
 * single `Aggregator` which owns the issue list, the progress bar and the
 * chunk manifest.
 */

pub mod aggregator;
pub mod issues;

pub use aggregator::{Aggregator, RunEvent, RunReport};
pub use issues::{IssueType, ProcessingIssue, Severity};
