/*!
 * Common test utilities for the dualsub test suite
 */

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use indicatif::ProgressBar;
use tempfile::TempDir;

use dualsub::app_config::Config;
use dualsub::providers::mock::{MockBackend, MockProvider};
use dualsub::storage::{ArtifactStore, ChunkManifest, FileArtifactStore};
use dualsub::{Chunk, ChunkOrchestrator, LlmBackend, RunReport};

/// Route library logs through the test harness; RUST_LOG=debug shows them
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Temporary working directory with transcripts, reference tracks and artifacts
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        init_logging();
        Ok(Self { dir: TempDir::new()? })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root().join("chunks.json")
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root().join("artifacts")
    }

    pub fn store(&self) -> FileArtifactStore {
        FileArtifactStore::new(self.artifacts_dir())
    }

    /// Write a transcript and a reference track with `cues` cues for a part
    pub fn add_chunk(&self, part: u32, cues: u32) -> Result<Chunk> {
        let transcripts = self.root().join("transcripts");
        fs::create_dir_all(&transcripts)?;
        let transcript = transcripts.join(format!("part_{}.txt", part));
        fs::write(&transcript, transcript_text(part, cues))?;

        let reference = transcripts.join(format!("part_{}.srt", part));
        fs::write(&reference, reference_srt(cues))?;

        Ok(Chunk::new(part).with_transcript(transcript).with_reference(reference))
    }

    /// Config with no backoff and every path inside the workspace
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.translation.common.retry_backoff_ms = 0;
        config.paths.manifest = self.manifest_path();
        config.paths.artifacts_dir = self.artifacts_dir();
        config
    }
}

/// Marker that appears in the prompt of exactly one part
pub fn part_marker(part: u32) -> String {
    format!("PART-{}-MARKER", part)
}

pub fn transcript_text(part: u32, cues: u32) -> String {
    let mut text = format!("{}\n", part_marker(part));
    for id in 1..=cues {
        text.push_str(&format!("第{}句话。\n", id));
    }
    text
}

fn timing_line(id: u32) -> String {
    let start = id * 2;
    format!("00:00:{:02},000 --> 00:00:{:02},500", start, start + 1)
}

/// Reference SRT with cues 1..=count, two seconds apart
pub fn reference_srt(count: u32) -> String {
    (1..=count)
        .map(|id| format!("{}\n{}\n第{}句话。\n\n", id, timing_line(id), id))
        .collect()
}

/// Model output covering the given reference cue ids
pub fn response_for(ids: impl IntoIterator<Item = u32>) -> String {
    ids.into_iter()
        .map(|id| format!("{}\n{}\n[zh] 第{}句话。\n[en] Sentence {}.\n\n", id, timing_line(id), id, id))
        .collect()
}

/// Model output with nothing the parser can use
pub fn garbage_response() -> String {
    "I'm sorry, I can only summarize this transcript.".to_string()
}

pub fn backend(provider: &MockProvider) -> Arc<dyn LlmBackend> {
    Arc::new(MockBackend::new(provider.clone(), "mock"))
}

/// Run the orchestrator over `chunks` with a file store rooted in the workspace
pub async fn run_chunks(
    workspace: &Workspace,
    config: &Config,
    provider: &MockProvider,
    manifest: ChunkManifest,
) -> Result<(RunReport, ChunkManifest)> {
    let store: Arc<dyn ArtifactStore> = Arc::new(workspace.store());
    run_with_store(workspace, config, provider, store, manifest).await
}

pub async fn run_with_store(
    workspace: &Workspace,
    config: &Config,
    provider: &MockProvider,
    store: Arc<dyn ArtifactStore>,
    manifest: ChunkManifest,
) -> Result<(RunReport, ChunkManifest)> {
    let orchestrator = ChunkOrchestrator::new(config, backend(provider), store)?;
    orchestrator
        .run(manifest, Some(workspace.manifest_path()), ProgressBar::hidden())
        .await
}
