/*!
 * Tests for error types
 */

use dualsub::errors::{AppError, ChunkError, ProviderError};
use dualsub::report::{IssueType, Severity};

#[test]
fn test_providerError_fromStatus_shouldClassifyAuthAndRateLimit() {
    assert!(matches!(
        ProviderError::from_status(401, "bad key".to_string()),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        ProviderError::from_status(429, "slow down".to_string()),
        ProviderError::RateLimitExceeded(_)
    ));
    match ProviderError::from_status(500, "boom".to_string()) {
        ProviderError::ApiError { status_code, message } => {
            assert_eq!(status_code, 500);
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected variant: {:?}", other),
    }
}

#[test]
fn test_chunkError_toIssue_shouldMapEachKindToOneIssueType() {
    let cases = [
        (ChunkError::PromptGen("no transcript".into()), IssueType::PromptGenError),
        (ChunkError::Translation("no response".into()), IssueType::TranslationError),
        (ChunkError::Validation("coverage".into()), IssueType::ValidationError),
        (ChunkError::Format("disk full".into()), IssueType::FormatError),
    ];

    for (error, expected) in cases {
        let issue = error.to_issue(7);
        assert_eq!(issue.issue_type, expected);
        assert_eq!(issue.severity, Severity::Error);
        assert_eq!(issue.chunk_part, Some(7));
        assert_eq!(issue.message, error.to_string());
    }
}

#[test]
fn test_chunkError_display_shouldIncludeDetail() {
    let error = ChunkError::Validation("attempt 1: 3 of 10 reference cues have no entry".into());
    assert!(error.to_string().starts_with("validation failed:"));
    assert!(error.to_string().contains("3 of 10"));
}

#[test]
fn test_configValidation_shouldReportAppConfigError() {
    let config = dualsub::Config {
        target_languages: vec![],
        ..Default::default()
    };
    let err = config.validate().unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::Config(_))));
}

#[test]
fn test_appError_fromChunkError_shouldWrap() {
    let err: AppError = ChunkError::Format("disk full".into()).into();
    assert_eq!(err.to_string(), "Chunk error: failed to persist result: disk full");
}
