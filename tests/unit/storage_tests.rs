/*!
 * Tests for the chunk manifest and artifact store
 */

use std::fs;
use std::path::PathBuf;

use dualsub::storage::{ArtifactStore, ChunkManifest, FileArtifactStore};
use dualsub::{Chunk, ChunkStatus, SubtitleEntry};
use tempfile::tempdir;

#[test]
fn test_load_withUpstreamManifest_shouldAcceptMinimalRecords() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.json");
    fs::write(
        &path,
        r#"{"chunks": [
            {"part_number": 2, "adjusted_transcript_path": "t/2.txt"},
            {"part_number": 1, "source_transcript_path": "t/1.txt", "status": "completed"}
        ]}"#,
    )
    .unwrap();

    let manifest = ChunkManifest::load(&path).unwrap();
    assert_eq!(manifest.chunks[0].part_number, 1);
    assert_eq!(manifest.get(2).unwrap().source_transcript_path, Some(PathBuf::from("t/2.txt")));
    assert_eq!(manifest.count_by_status(ChunkStatus::Completed), 1);
    assert_eq!(manifest.count_by_status(ChunkStatus::Pending), 1);
}

#[test]
fn test_load_withDuplicatePart_shouldFail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.json");
    fs::write(&path, r#"{"chunks": [{"part_number": 1}, {"part_number": 1}]}"#).unwrap();

    let err = ChunkManifest::load(&path).unwrap_err();
    assert!(err.to_string().contains("Duplicate part number 1"));
}

#[test]
fn test_save_shouldLeaveNoTemporaryFiles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("chunks.json");
    let mut manifest = ChunkManifest::new(vec![Chunk::new(1), Chunk::new(3)]);
    manifest.save(&path).unwrap();

    manifest.upsert(Chunk::new(2));
    manifest.save(&path).unwrap();

    let names: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["chunks.json".to_string()]);
    let parts: Vec<u32> = ChunkManifest::load(&path).unwrap().chunks.iter().map(|c| c.part_number).collect();
    assert_eq!(parts, vec![1, 2, 3]);
}

#[test]
fn test_fileArtifactStore_shouldLayOutFilesPerPartAndAttempt() {
    let dir = tempdir().unwrap();
    let store = FileArtifactStore::new(dir.path().join("artifacts"));

    tokio_test::block_on(async {
        let prompt = store.save_prompt(4, 1, "prompt text").await.unwrap();
        let response = store.save_response(4, 2, "raw text").await.unwrap();
        let entries = vec![SubtitleEntry::new(1).with_timing(0, 1_000).with_text("en", "Hello")];
        let parsed = store.save_parsed(4, 2, &entries).await.unwrap();

        assert!(prompt.ends_with("part_004/prompt_attempt_1.txt"));
        assert!(response.ends_with("part_004/response_attempt_2.txt"));
        assert!(parsed.ends_with("part_004/parsed_attempt_2.json"));
        assert_eq!(fs::read_to_string(&response).unwrap(), "raw text");
        assert!(store.exists(&parsed).await);
        assert!(!store.exists(&store.parsed_path(4, 3)).await);

        let loaded = FileArtifactStore::load_parsed(&parsed).await.unwrap();
        assert_eq!(loaded, entries);
    });
}
