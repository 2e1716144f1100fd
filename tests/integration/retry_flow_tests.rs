/*!
 * Retry budgets, validation-triggered regeneration and the last-chunk fallback
 */

use dualsub::providers::mock::MockProvider;
use dualsub::report::{IssueType, Severity};
use dualsub::storage::{ChunkManifest, FileArtifactStore};
use dualsub::ChunkStatus;

use crate::common::{garbage_response, part_marker, response_for, run_chunks, Workspace};

#[tokio::test]
async fn test_run_withBackendAlwaysFailing_shouldSpendExactlyApiRetriesPlusOneCalls() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.api_retries = 2;
    config.translation.common.validation_retries = 2;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap()]);
    let provider = MockProvider::failing();

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    // A translation error ends the chunk; no further validation attempts
    assert_eq!(provider.call_count(), 3);
    assert_eq!(report.failed, vec![1]);
    assert_eq!(report.transient_warnings.len(), 3);

    let chunk = manifest.get(1).unwrap();
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert!(chunk.parsed_data_path.is_none());
    assert!(chunk.response_path.is_none());
    assert!(chunk.token_counts.is_empty());

    let issues = report.issues_for(1);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issue_type, IssueType::TranslationError);
    assert_eq!(issues[0].severity, Severity::Error);
}

#[tokio::test]
async fn test_run_withPersistentValidationFailure_shouldRunValidationRetriesPlusOneAttempts() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.validation_retries = 2;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap()]);
    let provider = MockProvider::fixed(garbage_response());

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert!(report.has_failures());
    let chunk = manifest.get(1).unwrap();
    assert_eq!(chunk.status, ChunkStatus::Failed);
    assert!(chunk.parsed_data_path.is_none());

    let attempts: Vec<u32> = chunk.token_counts.iter().map(|t| t.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let store = ws.store();
    for attempt in 1..=3 {
        assert!(store.response_path(1, attempt).exists());
        assert!(!store.parsed_path(1, attempt).exists());
    }
    assert_eq!(chunk.response_path, Some(store.response_path(1, 3)));

    let errors: Vec<_> = report.issues_for(1).into_iter().filter(|i| i.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].issue_type, IssueType::ValidationError);
    assert!(errors[0].message.contains("attempt 3"));
}

#[tokio::test]
async fn test_run_withLastChunkNeverValid_shouldFallBackToAttemptWithMostEntries() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.validation_retries = 2;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 10).unwrap()]);
    // 3, 5 and 5 of 10 cues: below the relaxed coverage threshold every time
    let provider = MockProvider::sequence(vec![
        Some(response_for(1..=3)),
        Some(response_for(1..=5)),
        Some(response_for(6..=10)),
    ]);

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert_eq!(report.succeeded, vec![1]);
    let chunk = manifest.get(1).unwrap();
    assert_eq!(chunk.status, ChunkStatus::Completed);

    // Ties go to the earliest attempt
    let parsed = ws.store().parsed_path(1, 2);
    assert_eq!(chunk.parsed_data_path, Some(parsed.clone()));
    let entries = FileArtifactStore::load_parsed(&parsed).await.unwrap();
    let ids: Vec<u32> = entries.iter().map(|e| e.original_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let issues = report.issues_for(1);
    assert!(issues.iter().all(|i| !i.is_error()));
    assert!(issues.iter().any(|i| i.message.contains("last chunk fallback")));
}

#[tokio::test]
async fn test_run_withEarlierChunkNeverValid_shouldNotFallBack() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.validation_retries = 1;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 4).unwrap(), ws.add_chunk(2, 4).unwrap()]);
    let first = part_marker(1);
    let provider = MockProvider::new(move |prompt, _| {
        if prompt.contains(&first) {
            Some(response_for(1..=2))
        } else {
            Some(response_for(1..=4))
        }
    });

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.calls_matching(&part_marker(1)), 2);
    assert_eq!(provider.calls_matching(&part_marker(2)), 1);
    assert_eq!(report.failed, vec![1]);
    assert_eq!(report.succeeded, vec![2]);
    assert_eq!(manifest.get(1).unwrap().status, ChunkStatus::Failed);
}

#[tokio::test]
async fn test_run_withEmptyCompletionsThenValid_shouldCompleteWithOnlyTransientWarnings() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.api_retries = 3;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap()]);
    let provider = MockProvider::sequence(vec![
        Some(String::new()),
        Some("   \n".to_string()),
        Some(response_for(1..=3)),
    ]);

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 3);
    assert_eq!(report.succeeded, vec![1]);
    assert_eq!(report.transient_warnings.len(), 2);
    assert!(report.issues.is_empty());

    let chunk = manifest.get(1).unwrap();
    assert_eq!(chunk.token_counts.len(), 1);
    assert_eq!(chunk.token_counts[0].attempt, 1);
    assert_eq!(chunk.parsed_data_path, Some(ws.store().parsed_path(1, 1)));
}

#[tokio::test]
async fn test_run_withInvalidThenValidResponse_shouldRegenerateAndKeepAttemptsContiguous() {
    let ws = Workspace::new().unwrap();
    let config = ws.config();
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 3).unwrap(), ws.add_chunk(2, 3).unwrap()]);
    let provider = MockProvider::sequence(vec![Some(garbage_response()), Some(response_for(1..=3))]);

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(report.succeeded, vec![1, 2]);
    for part in [1, 2] {
        let chunk = manifest.get(part).unwrap();
        let attempts: Vec<u32> = chunk.token_counts.iter().map(|t| t.attempt).collect();
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(chunk.parsed_data_path, Some(ws.store().parsed_path(part, 2)));
        assert_eq!(chunk.response_path, Some(ws.store().response_path(part, 2)));
    }
    assert!(report.input_tokens > 0);
}

#[tokio::test]
async fn test_run_withShortTailOnFinalAttempt_shouldAcceptUnderRelaxedPolicy() {
    let ws = Workspace::new().unwrap();
    let mut config = ws.config();
    config.translation.common.validation_retries = 1;
    let manifest = ChunkManifest::new(vec![ws.add_chunk(1, 5).unwrap()]);
    // 4 of 5 cues meets the default 0.8 tail coverage
    let provider = MockProvider::fixed(response_for(1..=4));

    let (report, manifest) = run_chunks(&ws, &config, &provider, manifest).await.unwrap();

    assert_eq!(provider.call_count(), 2);
    assert_eq!(manifest.get(1).unwrap().parsed_data_path, Some(ws.store().parsed_path(1, 2)));
    assert!(report.issues.iter().any(|i| i.message.contains("Relaxed tail policy")));
    assert!(!report.issues.iter().any(|i| i.message.contains("last chunk fallback")));
}
