/*!
 * Full runs over a manifest: resumability, chunk selection, concurrency
 * and persistence failures
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use dualsub::providers::mock::MockProvider;
use dualsub::report::{IssueType, Severity};
use dualsub::storage::{ArtifactStore, ChunkManifest, FileArtifactStore};
use dualsub::{Chunk, ChunkStatus, SubtitleEntry};

use crate::common::{response_for, run_chunks, run_with_store, Workspace};

fn three_chunks(ws: &Workspace) -> ChunkManifest {
    ChunkManifest::new((1..=3).map(|part| ws.add_chunk(part, 3).unwrap()).collect())
}

/// Every file under a directory with its contents
fn snapshot(dir: &Path) -> BTreeMap<PathBuf, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let content = fs::read_to_string(&path).unwrap();
                files.insert(path, content);
            }
        }
    }
    files
}

fn assert_parsed_path_invariant(manifest: &ChunkManifest) {
    for chunk in &manifest.chunks {
        assert_eq!(
            chunk.status == ChunkStatus::Completed,
            chunk.parsed_data_path.is_some(),
            "part {} is {} with parsed_data_path {:?}",
            chunk.part_number,
            chunk.status,
            chunk.parsed_data_path
        );
    }
}

#[tokio::test]
async fn test_run_withCompletedManifest_shouldSkipEverythingOnRerun() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let provider = MockProvider::fixed(response_for(1..=3));

    let (first, _) = run_chunks(&ws, &config, &provider, three_chunks(&ws)).await.unwrap();
    assert_eq!(first.succeeded, vec![1, 2, 3]);
    assert_eq!(provider.call_count(), 3);
    let artifacts = snapshot(&ws.artifacts_dir());

    // Resume from what the first run left on disk
    let saved = ChunkManifest::load(ws.manifest_path()).unwrap();
    assert_eq!(saved.count_by_status(ChunkStatus::Completed), 3);
    let rerun_provider = MockProvider::fixed(response_for(1..=3));
    let (second, manifest) = run_chunks(&ws, &config, &rerun_provider, saved.clone()).await.unwrap();

    assert_eq!(rerun_provider.call_count(), 0);
    assert_eq!(second.skipped, vec![1, 2, 3]);
    assert!(second.succeeded.is_empty());
    assert_eq!(manifest, saved);
    assert_eq!(snapshot(&ws.artifacts_dir()), artifacts);
}

#[tokio::test]
async fn test_run_withMissingParsedArtifact_shouldReprocessOnlyThatChunk() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let provider = MockProvider::fixed(response_for(1..=3));
    let (_, manifest) = run_chunks(&ws, &config, &provider, three_chunks(&ws)).await.unwrap();

    let parsed = manifest.get(2).unwrap().parsed_data_path.clone().unwrap();
    fs::remove_file(&parsed).unwrap();

    let rerun_provider = MockProvider::fixed(response_for(1..=3));
    let (report, manifest) = run_chunks(&ws, &config, &rerun_provider, manifest).await.unwrap();

    assert_eq!(rerun_provider.call_count(), 1);
    assert_eq!(report.skipped, vec![1, 3]);
    assert_eq!(report.succeeded, vec![2]);
    assert!(parsed.exists());
    assert_parsed_path_invariant(&manifest);
}

#[tokio::test]
async fn test_run_withForceReprocess_shouldRunCompletedChunksFromScratch() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    let provider = MockProvider::fixed(response_for(1..=3));
    let (_, manifest) = run_chunks(&ws, &config, &provider, three_chunks(&ws)).await.unwrap();

    config.run.force_reprocess = true;
    let rerun_provider = MockProvider::fixed(response_for(1..=3));
    let (report, manifest) = run_chunks(&ws, &config, &rerun_provider, manifest).await.unwrap();

    assert_eq!(rerun_provider.call_count(), 3);
    assert_eq!(report.succeeded, vec![1, 2, 3]);
    for chunk in &manifest.chunks {
        // Token history restarts with the forced run
        assert_eq!(chunk.token_counts.len(), 1);
    }
}

#[tokio::test]
async fn test_run_withOnlyPart_shouldSkipOtherChunks() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.run.only_part = Some(2);
    let provider = MockProvider::fixed(response_for(1..=3));

    let (report, manifest) = run_chunks(&ws, &config, &provider, three_chunks(&ws)).await.unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(report.succeeded, vec![2]);
    assert_eq!(report.skipped, vec![1, 3]);
    assert_eq!(manifest.get(1).unwrap().status, ChunkStatus::Pending);
    assert_eq!(manifest.get(2).unwrap().status, ChunkStatus::Completed);
}

#[tokio::test]
async fn test_run_withConcurrencyLimit_shouldNeverExceedIt() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.max_concurrent_chunks = 2;
    let manifest = ChunkManifest::new((1..=5).map(|part| ws.add_chunk(part, 3).unwrap()).collect());
    let provider = MockProvider::fixed(response_for(1..=3)).with_delay(50);

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 5);
    assert_eq!(provider.max_concurrent_calls(), 2);
    assert_eq!(report.succeeded, vec![1, 2, 3, 4, 5]);
    assert_eq!(manifest.count_by_status(ChunkStatus::Completed), 5);
    assert_parsed_path_invariant(&manifest);

    let on_disk = ChunkManifest::load(ws.manifest_path()).unwrap();
    assert_eq!(on_disk, manifest);
}

#[tokio::test]
async fn test_run_withMissingTranscript_shouldFailChunkWithoutCallingBackend() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let mut broken = ws.add_chunk(2, 3).unwrap();
    broken.source_transcript_path = Some(ws.root().join("transcripts").join("missing.txt"));
    let no_path = Chunk::new(3);
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap(), broken, no_path]);
    let provider = MockProvider::fixed(response_for(1..=3));

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(report.succeeded, vec![1]);
    assert_eq!(report.failed, vec![2, 3]);
    for part in [2, 3] {
        let issues = report.issues_for(part);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueType::PromptGenError);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(manifest.get(part).unwrap().prompt_path.is_none());
    }
    assert_parsed_path_invariant(&manifest);
}

#[tokio::test]
async fn test_run_withoutReferenceTrack_shouldCompleteWithWarnings() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let mut chunk = ws.add_chunk(1, 3).unwrap();
    chunk.reference_timing_path = None;
    let provider = MockProvider::fixed(response_for(1..=3));

    let (report, manifest) = run_chunks(&ws, &config, &provider, ChunkManifest::new(vec![chunk])).await.unwrap();

    assert_eq!(report.succeeded, vec![1]);
    assert_eq!(report.error_count(), 0);
    assert!(report.warning_count() >= 2);
    let prompt = fs::read_to_string(manifest.get(1).unwrap().prompt_path.clone().unwrap()).unwrap();
    assert!(prompt.contains("(no reference timing available)"));
}

/// Store that accepts prompts but cannot persist responses
struct ReadOnlyResponses {
    inner: FileArtifactStore,
}

#[async_trait]
impl ArtifactStore for ReadOnlyResponses {
    async fn save_prompt(&self, part: u32, attempt: u32, prompt: &str) -> Result<PathBuf> {
        self.inner.save_prompt(part, attempt, prompt).await
    }

    async fn save_response(&self, _part: u32, _attempt: u32, _response: &str) -> Result<PathBuf> {
        Err(anyhow!("No space left on device"))
    }

    async fn save_parsed(&self, part: u32, attempt: u32, entries: &[SubtitleEntry]) -> Result<PathBuf> {
        self.inner.save_parsed(part, attempt, entries).await
    }

    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }
}

#[tokio::test]
async fn test_run_withFailingArtifactStore_shouldFailChunkWithFormatError() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let store: Arc<dyn ArtifactStore> = Arc::new(ReadOnlyResponses { inner: ws.store() });
    let provider = MockProvider::fixed(response_for(1..=3));
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap()]);

    let (report, manifest) = run_with_store(&ws, &config, &provider, store, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 1);
    assert_eq!(report.failed, vec![1]);
    let issues = report.issues_for(1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, IssueType::FormatError);
    assert!(issues[0].message.contains("No space left on device"));

    let chunk = manifest.get(1).unwrap();
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert!(chunk.prompt_path.is_some());
    assert!(chunk.parsed_data_path.is_none());
}

#[tokio::test]
async fn test_runReport_writeJson_shouldSerializeOutcome() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let provider = MockProvider::fixed(response_for(1..=3));
    let (report, _) = run_chunks(&ws, &config, &provider, three_chunks(&ws)).await.unwrap();

    let path = ws.root().join("report.json");
    report.write_json(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(json["succeeded"], serde_json::json!([1, 2, 3]));
    assert_eq!(json["run_id"].as_str().unwrap(), report.run_id);
    assert!(report.render().contains("succeeded: 3"));
}
