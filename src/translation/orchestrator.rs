/*!
 * Chunk orchestration.
 *
 * Each selected chunk is driven through its state machine by one task:
 *
 * ```text
 * pending -> prompting -> translating -> completed | failed
 * ```
 *
 * Inside `translating` a chunk loops over attempts. An attempt invokes the
 * backend (repeating failed calls with exponential backoff), persists the raw
 * response, parses it and validates the entries. A rejected attempt is kept
 * so the last chunk of a run can fall back to the best one once validation
 * retries run out.
 *
 * Up to `max_concurrent_chunks` tasks run at once. Tasks report through
 * `RunEvent`s; the aggregator owns the report and the manifest.
 */

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::app_config::Config;
use crate::chunk::{Chunk, ChunkStatus};
use crate::errors::ChunkError;
use crate::file_utils::FileManager;
use crate::providers::{BackendResponse, LlmBackend};
use crate::report::aggregator::{Aggregator, RunEvent, RunReport};
use crate::report::issues::{error_messages, IssueType, ProcessingIssue};
use crate::storage::{ArtifactStore, ChunkManifest};
use crate::subtitle::{ReferenceTrack, SubtitleEntry};
use crate::translation::parser::ResponseParser;
use crate::translation::prompts::{PromptBuilder, PromptTemplate};
use crate::translation::retry::RetryPolicy;
use crate::validation::{ValidationInput, Validator};

/// One rejected generation, retained while the chunk is in flight
#[derive(Debug, Clone)]
pub struct Attempt {
    pub attempt_number: u32,
    pub raw_response_text: String,
    pub parsing_issues: Vec<ProcessingIssue>,
    pub validation_issues: Vec<ProcessingIssue>,
    pub entry_count: usize,
}

/// Which chunks a run targets and how hard it tries
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub model: String,
    pub validation_retries: u32,
    pub max_concurrent_chunks: usize,
    pub force_reprocess: bool,
    pub only_part: Option<u32>,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.translation.get_model(),
            validation_retries: config.translation.common.validation_retries,
            max_concurrent_chunks: config.translation.common.max_concurrent_chunks.max(1),
            force_reprocess: config.run.force_reprocess,
            only_part: config.run.only_part,
        }
    }
}

/// Drives chunks from their current state to a terminal state
pub struct ChunkOrchestrator {
    backend: Arc<dyn LlmBackend>,
    store: Arc<dyn ArtifactStore>,
    prompts: PromptBuilder,
    parser: ResponseParser,
    validator: Validator,
    retry: RetryPolicy,
    settings: RunSettings,
}

impl ChunkOrchestrator {
    /// Build an orchestrator from configuration
    pub fn new(config: &Config, backend: Arc<dyn LlmBackend>, store: Arc<dyn ArtifactStore>) -> Result<Self> {
        let template = match &config.paths.prompt_template {
            Some(path) => {
                let text = FileManager::read_to_string(path)
                    .with_context(|| format!("Failed to load prompt template {}", path.display()))?;
                PromptTemplate::new(&text)
            }
            None => PromptTemplate::default(),
        };

        Ok(Self {
            backend,
            store,
            prompts: PromptBuilder::new(template, config.source_language.clone(), config.target_languages.clone()),
            parser: ResponseParser::new(config.output_languages()),
            validator: Validator::new(config.validation.clone(), config.primary_target_language()),
            retry: RetryPolicy::from_config(&config.translation.common),
            settings: RunSettings::from_config(config),
        })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Whether a chunk takes part in this run
    pub async fn is_eligible(&self, chunk: &Chunk) -> bool {
        if let Some(only) = self.settings.only_part {
            if chunk.part_number != only {
                return false;
            }
        }
        if self.settings.force_reprocess || chunk.status != ChunkStatus::Completed {
            return true;
        }
        match &chunk.parsed_data_path {
            Some(path) => !self.store.exists(path).await,
            None => true,
        }
    }

    /// Process every eligible chunk of the manifest
    ///
    /// The manifest is rewritten at `manifest_path` after each terminal
    /// transition and once more at the end.
    pub async fn run(
        &self,
        manifest: ChunkManifest,
        manifest_path: Option<PathBuf>,
        progress: ProgressBar,
    ) -> Result<(RunReport, ChunkManifest)> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let mut selected = Vec::new();
        for chunk in &manifest.chunks {
            if self.is_eligible(chunk).await {
                selected.push(chunk.clone());
            } else {
                let _ = tx.send(RunEvent::ChunkSkipped { part: chunk.part_number });
            }
        }

        // Fixed before any task starts
        let last_part = selected.iter().map(|c| c.part_number).max();
        info!(
            "Processing {} of {} chunks with up to {} in parallel",
            selected.len(),
            manifest.chunks.len(),
            self.settings.max_concurrent_chunks
        );

        progress.set_length(selected.len() as u64);
        let handle = Aggregator::new(manifest, manifest_path, progress).spawn(rx);

        stream::iter(selected)
            .map(|chunk| {
                let tx = tx.clone();
                let is_last = Some(chunk.part_number) == last_part;
                async move { self.process_chunk(chunk, is_last, &tx).await }
            })
            .buffer_unordered(self.settings.max_concurrent_chunks)
            .collect::<Vec<()>>()
            .await;

        drop(tx);
        handle.await.context("Report aggregator task failed")?
    }

    /// Run one chunk to a terminal state
    pub async fn process_chunk(&self, mut chunk: Chunk, is_last_chunk: bool, tx: &UnboundedSender<RunEvent>) {
        let part = chunk.part_number;
        if self.settings.force_reprocess {
            chunk.reset();
        }
        chunk.begin();
        let _ = tx.send(RunEvent::ChunkStarted { part });

        match self.drive(&mut chunk, is_last_chunk, tx).await {
            Ok(()) => info!("Part {} completed", part),
            Err(err) => {
                error!("Part {} failed: {}", part, err);
                chunk.fail(err.to_string());
                let _ = tx.send(RunEvent::Issue(err.to_issue(part)));
            }
        }

        let _ = tx.send(RunEvent::ChunkFinished(chunk));
    }

    async fn drive(&self, chunk: &mut Chunk, is_last_chunk: bool, tx: &UnboundedSender<RunEvent>) -> Result<(), ChunkError> {
        let part = chunk.part_number;
        set_status(chunk, ChunkStatus::Prompting, tx);

        let transcript_path = chunk
            .source_transcript_path
            .clone()
            .ok_or_else(|| ChunkError::PromptGen("chunk has no source transcript".to_string()))?;
        let transcript = tokio::fs::read_to_string(&transcript_path)
            .await
            .map_err(|e| ChunkError::PromptGen(format!("cannot read {}: {}", transcript_path.display(), e)))?;

        let reference_text = match &chunk.reference_timing_path {
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!("Part {}: cannot read reference track {}: {}", part, path.display(), e);
                    None
                }
            },
            None => None,
        };
        let reference = reference_text.as_deref().map(ReferenceTrack::parse_srt);

        let prompt = self
            .prompts
            .build(part, Some(&transcript), reference_text.as_deref())
            .map_err(|issue| ChunkError::PromptGen(issue.message))?;
        for warning in prompt.warnings {
            let _ = tx.send(RunEvent::Issue(warning));
        }

        let prompt_path = self
            .store
            .save_prompt(part, 1, &prompt.text)
            .await
            .map_err(|e| ChunkError::Format(format!("{:#}", e)))?;
        chunk.prompt_path = Some(prompt_path);

        set_status(chunk, ChunkStatus::Translating, tx);

        let max_attempts = self.settings.validation_retries.saturating_add(1);
        let mut attempts: Vec<Attempt> = Vec::new();

        for attempt_number in 1..=max_attempts {
            let response = self
                .invoke_with_retry(part, attempt_number, &prompt.text, tx)
                .await
                .ok_or_else(|| {
                    ChunkError::Translation(format!(
                        "{} gave no usable response in {} calls",
                        self.backend.name(),
                        self.retry.max_calls()
                    ))
                })?;

            chunk.record_tokens(attempt_number, response.input_tokens, response.output_tokens);
            let _ = tx.send(RunEvent::Tokens {
                part,
                attempt: attempt_number,
                input_tokens: response.input_tokens,
                output_tokens: response.output_tokens,
            });

            let response_path = self
                .store
                .save_response(part, attempt_number, &response.text)
                .await
                .map_err(|e| ChunkError::Format(format!("{:#}", e)))?;
            chunk.response_path = Some(response_path);

            let parsed = self.parser.parse(&response.text, part);
            let outcome = self.validator.validate(&ValidationInput {
                entries: &parsed.entries,
                parsing_issues: &parsed.issues,
                reference: reference.as_ref(),
                part,
                is_last_chunk,
                is_final_attempt: attempt_number == max_attempts,
            });

            if outcome.is_valid {
                let parsed_path = self
                    .store
                    .save_parsed(part, attempt_number, &parsed.entries)
                    .await
                    .map_err(|e| ChunkError::Format(format!("{:#}", e)))?;
                for issue in parsed.issues.into_iter().chain(outcome.issues) {
                    let _ = tx.send(RunEvent::Issue(issue));
                }
                debug!("Part {}: attempt {} accepted with {} entries", part, attempt_number, parsed.entries.len());
                chunk.complete(parsed_path);
                return Ok(());
            }

            let errors = error_messages(&outcome.issues);
            warn!(
                "Part {}: attempt {}/{} failed validation: {}",
                part,
                attempt_number,
                max_attempts,
                errors.join("; ")
            );
            let _ = tx.send(RunEvent::ValidationAttemptFailed {
                part,
                attempt: attempt_number,
                errors,
            });

            attempts.push(Attempt {
                attempt_number,
                raw_response_text: response.text,
                parsing_issues: parsed.issues,
                validation_issues: outcome.issues,
                entry_count: parsed.entries.len(),
            });
        }

        if is_last_chunk {
            if self.accept_fallback(chunk, &attempts, tx).await? {
                return Ok(());
            }
        }

        let summary = attempts
            .iter()
            .map(|a| format!("attempt {}: {}", a.attempt_number, error_messages(&a.validation_issues).join("; ")))
            .collect::<Vec<_>>()
            .join(" | ");
        Err(ChunkError::Validation(summary))
    }

    /// Call the backend until it answers or the call budget is spent
    async fn invoke_with_retry(
        &self,
        part: u32,
        attempt: u32,
        prompt: &str,
        tx: &UnboundedSender<RunEvent>,
    ) -> Option<BackendResponse> {
        let max_calls = self.retry.max_calls();
        for call in 1..=max_calls {
            if let Some(response) = self.backend.invoke(prompt, &self.settings.model).await {
                return Some(response);
            }

            let message = format!("{} gave no usable response", self.backend.name());
            warn!("Part {}: attempt {} call {}/{} failed: {}", part, attempt, call, max_calls, message);
            let _ = tx.send(RunEvent::ApiAttemptFailed { part, attempt, call, message });

            if call < max_calls {
                let delay = self.retry.backoff(call);
                if !delay.is_zero() {
                    debug!("Part {}: retrying in {:?}", part, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
        None
    }

    /// Accept the best rejected attempt of the last chunk
    ///
    /// Every retained response is parsed again and the one with the most
    /// entries wins; ties go to the earliest attempt. Returns false when no
    /// attempt produced any entry.
    async fn accept_fallback(
        &self,
        chunk: &mut Chunk,
        attempts: &[Attempt],
        tx: &UnboundedSender<RunEvent>,
    ) -> Result<bool, ChunkError> {
        let part = chunk.part_number;
        if attempts.iter().all(|a| a.entry_count == 0) {
            return Ok(false);
        }

        let mut best: Option<(u32, Vec<SubtitleEntry>)> = None;
        for attempt in attempts {
            let reparsed = self.parser.parse(&attempt.raw_response_text, part);
            let better = match &best {
                Some((_, entries)) => reparsed.entries.len() > entries.len(),
                None => !reparsed.entries.is_empty(),
            };
            if better {
                best = Some((attempt.attempt_number, reparsed.entries));
            }
        }

        let Some((attempt_number, entries)) = best else {
            return Ok(false);
        };

        let parsed_path = self
            .store
            .save_parsed(part, attempt_number, &entries)
            .await
            .map_err(|e| ChunkError::Format(format!("{:#}", e)))?;

        warn!(
            "Part {}: accepting attempt {} ({} entries) as fallback after {} failed validations",
            part,
            attempt_number,
            entries.len(),
            attempts.len()
        );
        let _ = tx.send(RunEvent::Issue(
            ProcessingIssue::warning(
                IssueType::ValidationError,
                format!(
                    "Accepted attempt {} with {} entries despite validation errors (last chunk fallback)",
                    attempt_number,
                    entries.len()
                ),
            )
            .for_chunk(part),
        ));

        chunk.complete(parsed_path);
        Ok(true)
    }
}

fn set_status(chunk: &mut Chunk, status: ChunkStatus, tx: &UnboundedSender<RunEvent>) {
    chunk.status = status;
    let _ = tx.send(RunEvent::StatusChanged {
        part: chunk.part_number,
        status,
    });
}
