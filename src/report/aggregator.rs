use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, warn};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::chunk::{Chunk, ChunkStatus};
use crate::file_utils::FileManager;
use crate::report::issues::{ProcessingIssue, Severity};
use crate::storage::ChunkManifest;

/// Immutable record emitted by a chunk task
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A chunk was not eligible for this run
    ChunkSkipped { part: u32 },
    /// A chunk task took ownership of a chunk
    ChunkStarted { part: u32 },
    StatusChanged { part: u32, status: ChunkStatus },
    /// A backend call failed and will be retried if budget remains
    ApiAttemptFailed { part: u32, attempt: u32, call: u32, message: String },
    /// A parsed response failed validation
    ValidationAttemptFailed { part: u32, attempt: u32, errors: Vec<String> },
    Tokens { part: u32, attempt: u32, input_tokens: Option<u64>, output_tokens: Option<u64> },
    Issue(ProcessingIssue),
    /// Final state of a chunk; exactly one per started chunk
    ChunkFinished(Chunk),
}

/// Summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub succeeded: Vec<u32>,
    pub failed: Vec<u32>,
    pub skipped: Vec<u32>,
    pub issues: Vec<ProcessingIssue>,
    /// Retried failures; informational only
    pub transient_warnings: Vec<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Local::now().to_rfc3339(),
            elapsed_ms: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            issues: Vec::new(),
            transient_warnings: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// True if any targeted chunk ended failed
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }

    /// Issues attached to one chunk
    pub fn issues_for(&self, part: u32) -> Vec<&ProcessingIssue> {
        self.issues.iter().filter(|i| i.chunk_part == Some(part)).collect()
    }

    /// Console rendering
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run {} ({:.1}s)", self.run_id, self.elapsed_ms as f64 / 1000.0);
        let _ = writeln!(
            out,
            "  succeeded: {}  failed: {}  skipped: {}",
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len()
        );
        if !self.failed.is_empty() {
            let parts: Vec<String> = self.failed.iter().map(|p| p.to_string()).collect();
            let _ = writeln!(out, "  failed parts: {}", parts.join(", "));
        }
        if self.input_tokens > 0 || self.output_tokens > 0 {
            let _ = writeln!(out, "  tokens: {} in / {} out", self.input_tokens, self.output_tokens);
        }
        if !self.transient_warnings.is_empty() {
            let _ = writeln!(out, "  retried backend failures: {}", self.transient_warnings.len());
        }
        if !self.issues.is_empty() {
            let _ = writeln!(out, "  issues ({} errors, {} warnings):", self.error_count(), self.warning_count());
            for issue in &self.issues {
                let _ = writeln!(out, "    {}", issue);
            }
        }
        out
    }

    /// Write the report as pretty JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        FileManager::write_to_file(path, &json)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Styled progress bar over the chunks of a run
pub fn chunk_progress_bar(total: u64) -> ProgressBar {
    let progress_bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("█▓▒░"));
    progress_bar
}

/// Single owner of all mutable run state
pub struct Aggregator {
    report: RunReport,
    manifest: ChunkManifest,
    manifest_path: Option<PathBuf>,
    progress: ProgressBar,
    started: Instant,
}

impl Aggregator {
    pub fn new(manifest: ChunkManifest, manifest_path: Option<PathBuf>, progress: ProgressBar) -> Self {
        Self {
            report: RunReport::new(),
            manifest,
            manifest_path,
            progress,
            started: Instant::now(),
        }
    }

    /// Consume events until every sender is dropped, then return the final state
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<RunEvent>) -> JoinHandle<Result<(RunReport, ChunkManifest)>> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event);
            }
            self.finish()
        })
    }

    pub fn handle(&mut self, event: RunEvent) {
        match event {
            RunEvent::ChunkSkipped { part } => {
                debug!("Part {} skipped", part);
                self.report.skipped.push(part);
            }
            RunEvent::ChunkStarted { part } => {
                self.progress.set_message(format!("part {} started", part));
            }
            RunEvent::StatusChanged { part, status } => {
                if let Some(chunk) = self.manifest.get_mut(part) {
                    chunk.status = status;
                }
                self.progress.set_message(format!("part {}: {}", part, status));
            }
            RunEvent::ApiAttemptFailed { part, attempt, call, message } => {
                let text = format!("part {} attempt {} call {}: {}", part, attempt, call, message);
                self.report.transient_warnings.push(text);
            }
            RunEvent::ValidationAttemptFailed { part, attempt, errors } => {
                debug!("Part {} attempt {} failed validation with {} errors", part, attempt, errors.len());
            }
            RunEvent::Tokens { input_tokens, output_tokens, .. } => {
                self.report.input_tokens += input_tokens.unwrap_or(0);
                self.report.output_tokens += output_tokens.unwrap_or(0);
            }
            RunEvent::Issue(issue) => {
                self.report.issues.push(issue);
            }
            RunEvent::ChunkFinished(chunk) => {
                let part = chunk.part_number;
                match chunk.status {
                    ChunkStatus::Completed => self.report.succeeded.push(part),
                    ChunkStatus::Failed => self.report.failed.push(part),
                    other => warn!("Part {} finished in non-terminal state {}", part, other),
                }
                self.manifest.upsert(chunk);
                self.progress.inc(1);
                if let Err(e) = self.save_manifest() {
                    error!("Failed to update chunk manifest after part {}: {:#}", part, e);
                }
            }
        }
    }

    fn save_manifest(&self) -> Result<()> {
        match &self.manifest_path {
            Some(path) => self.manifest.save(path),
            None => Ok(()),
        }
    }

    pub fn finish(mut self) -> Result<(RunReport, ChunkManifest)> {
        self.report.succeeded.sort_unstable();
        self.report.failed.sort_unstable();
        self.report.skipped.sort_unstable();
        self.report.elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.progress.finish_with_message(format!(
            "{} completed, {} failed",
            self.report.succeeded.len(),
            self.report.failed.len()
        ));
        self.save_manifest()?;
        Ok((self.report, self.manifest))
    }
}
