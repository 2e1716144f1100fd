/*!
 * Tests for prompt building, response parsing and validation working together
 */

use dualsub::report::IssueType;
use dualsub::subtitle::ReferenceTrack;
use dualsub::translation::{PromptBuilder, PromptTemplate, ResponseParser};
use dualsub::validation::{ValidationConfig, ValidationInput, Validator};

use crate::common::{reference_srt, response_for, transcript_text};

fn parser() -> ResponseParser {
    ResponseParser::new(vec!["zh".to_string(), "en".to_string()])
}

#[test]
fn test_promptBuilder_withReference_shouldEmbedBothInputs() {
    let builder = PromptBuilder::new(PromptTemplate::default(), "zh", vec!["en".to_string()]);
    let reference = reference_srt(2);
    let prompt = builder.build(3, Some(&transcript_text(3, 2)), Some(&reference)).unwrap();

    assert!(prompt.warnings.is_empty());
    assert!(prompt.text.contains("PART-3-MARKER"));
    assert!(prompt.text.contains("00:00:04,000 --> 00:00:05,500"));
    assert!(prompt.text.contains("[en]"));
    assert!(prompt.text.contains("English"));
}

#[test]
fn test_promptBuilder_withCustomTemplate_shouldSubstitutePlaceholders() {
    let template = PromptTemplate::new("{source_code}->{target_code}\n{reference}\n{transcript}");
    let builder = PromptBuilder::new(template, "zh", vec!["fr".to_string()]);
    let prompt = builder.build(1, Some("你好"), None).unwrap();

    assert_eq!(prompt.text, "zh->fr\n(no reference timing available)\n你好");
    assert_eq!(prompt.warnings.len(), 1);
}

#[test]
fn test_parseThenValidate_withFencedResponse_shouldAcceptFullCoverage() {
    let raw = format!("Here you go:\n```\n{}```\n", response_for(1..=3));
    let outcome = parser().parse(&raw, 1);
    let track = ReferenceTrack::parse_srt(&reference_srt(3));

    assert_eq!(outcome.entries.len(), 3);
    let validation = Validator::new(ValidationConfig::default(), "en").validate(&ValidationInput {
        entries: &outcome.entries,
        parsing_issues: &outcome.issues,
        reference: Some(&track),
        part: 1,
        is_last_chunk: false,
        is_final_attempt: false,
    });
    assert!(validation.is_valid);
    assert_eq!(validation.errors().count(), 0);
}

#[test]
fn test_parseThenValidate_withTruncatedResponse_shouldRejectForCoverage() {
    let mut raw = response_for(1..=2);
    raw.push_str("3\n00:00:06,000 --> 00:00:07,500\n");
    let outcome = parser().parse(&raw, 2);
    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.rejected_count(), 1);

    let track = ReferenceTrack::parse_srt(&reference_srt(3));
    let validation = Validator::new(ValidationConfig::default(), "en").validate(&ValidationInput {
        entries: &outcome.entries,
        parsing_issues: &outcome.issues,
        reference: Some(&track),
        part: 2,
        is_last_chunk: false,
        is_final_attempt: false,
    });
    assert!(!validation.is_valid);
    assert!(validation.errors().all(|i| i.issue_type == IssueType::ValidationError));
}

#[test]
fn test_parse_withJsonArray_shouldReadTextsAndTiming() {
    let raw = r#"[
        {"id": 1, "start": "00:00:02,000", "end": "00:00:03,500", "zh": "第1句话。", "en": "Sentence 1."},
        {"id": 2, "timing": "00:00:04,000 --> 00:00:05,500", "texts": {"zh": "第2句话。", "en": "Sentence 2."}},
        {"id": "x"}
    ]"#;
    let outcome = parser().parse(raw, 1);

    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.entries[1].text("en"), Some("Sentence 2."));
    assert_eq!(outcome.rejected_count(), 1);
}
