/*!
 * Response parser.
 *
 * Turns raw model output into subtitle entries. Parsing never fails: every
 * malformed fragment becomes a `ParseError` warning and is skipped, and all
 * well-formed entries around it are kept.
 *
 * Two shapes are accepted. The block format requested by the default prompt:
 *
 * ```text
 * 12
 * 00:01:02,500 --> 00:01:05,000
 * [zh] 原文
 * [en] Translation
 * ```
 *
 * and a JSON array of objects with an `id`, optional `start`/`end` or
 * `timing`, and either a `texts` object or one field per language.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;

use crate::language_utils::language_codes_match;
use crate::report::issues::{IssueType, ProcessingIssue};
use crate::subtitle::{parse_timestamp, split_blocks, SubtitleEntry, TimeRange};

static BRACKET_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[([A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*)\]\s*(.*)$").expect("Invalid label regex")
});

static COLON_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*)\s*[:：]\s*(.*)$").expect("Invalid label regex")
});

/// Entries recovered from one response and the problems met on the way
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub entries: Vec<SubtitleEntry>,
    pub issues: Vec<ProcessingIssue>,
}

impl ParseOutcome {
    /// Number of fragments that were skipped
    pub fn rejected_count(&self) -> usize {
        self.issues.iter().filter(|i| i.issue_type == IssueType::ParseError).count()
    }
}

enum Label<'a> {
    Known(String, &'a str),
    Unknown(String),
    None,
}

/// Parser for dual-language model output
#[derive(Debug, Clone)]
pub struct ResponseParser {
    languages: Vec<String>,
}

impl ResponseParser {
    /// `languages` are the configured codes the model is expected to label lines with
    pub fn new(languages: Vec<String>) -> Self {
        Self { languages }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Parse a raw response
    pub fn parse(&self, raw: &str, part: u32) -> ParseOutcome {
        let text = strip_code_fences(raw);
        let mut outcome = ParseOutcome::default();

        if text.trim_start().starts_with('[') && !BRACKET_LABEL.is_match(text.trim_start().lines().next().unwrap_or("")) {
            match serde_json::from_str::<Value>(text.trim()) {
                Ok(Value::Array(items)) => {
                    self.parse_json_items(&items, part, &mut outcome);
                    return self.finish(outcome, part);
                }
                Ok(_) | Err(_) => {
                    debug!("Part {}: response looks like JSON but is not an array, trying block format", part);
                }
            }
        }

        for block in group_blocks(&text) {
            self.parse_block(&block, part, &mut outcome);
        }
        self.finish(outcome, part)
    }

    fn finish(&self, mut outcome: ParseOutcome, part: u32) -> ParseOutcome {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(outcome.entries.len());
        for entry in outcome.entries {
            if seen.insert(entry.original_id) {
                entries.push(entry);
            } else {
                outcome.issues.push(parse_issue(
                    format!("Duplicate entry id {}; keeping the first", entry.original_id),
                    None,
                ).for_chunk(part));
            }
        }
        outcome.entries = entries;
        outcome
    }

    /// Resolve a language label against the configured codes
    fn classify<'a>(&self, line: &'a str) -> Label<'a> {
        if let Some(caps) = BRACKET_LABEL.captures(line) {
            let label = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            return match self.resolve(label) {
                Some(code) => Label::Known(code, rest),
                None => Label::Unknown(label.to_string()),
            };
        }
        // "code: text" only counts when the code is one we expect, so ordinary
        // sentences with a colon are not mistaken for labels
        if let Some(caps) = COLON_LABEL.captures(line) {
            let label = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let rest = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if let Some(code) = self.resolve(label) {
                return Label::Known(code, rest);
            }
        }
        Label::None
    }

    fn resolve(&self, label: &str) -> Option<String> {
        self.languages
            .iter()
            .find(|code| language_codes_match(code, label))
            .cloned()
    }

    fn parse_block(&self, block: &[&str], part: u32, outcome: &mut ParseOutcome) {
        let mut lines = block.iter().copied().peekable();
        let Some(id_line) = lines.next() else { return };

        let Ok(id) = id_line.trim().parse::<u32>() else {
            outcome.issues.push(parse_issue("Block does not start with an entry id", Some(id_line)).for_chunk(part));
            return;
        };

        let mut entry = SubtitleEntry::new(id);

        if let Some(line) = lines.peek().copied() {
            if TimeRange::looks_like_timing(line) {
                lines.next();
                match TimeRange::parse_line(line) {
                    Ok(timing) => entry.timing = Some(timing),
                    Err(_) => {
                        outcome.issues.push(
                            parse_issue(format!("Entry {} has a malformed timing line", id), Some(line)).for_chunk(part),
                        );
                        return;
                    }
                }
            }
        }

        let mut current: Option<String> = None;
        for line in lines {
            match self.classify(line) {
                Label::Known(code, text) => {
                    let text = text.trim();
                    match entry.texts.get_mut(&code) {
                        Some(existing) if !text.is_empty() => {
                            if !existing.is_empty() {
                                existing.push('\n');
                            }
                            existing.push_str(text);
                        }
                        Some(_) => {}
                        None => {
                            entry.texts.insert(code.clone(), text.to_string());
                        }
                    }
                    current = Some(code);
                }
                Label::Unknown(label) => {
                    outcome.issues.push(
                        parse_issue(format!("Entry {} uses unknown language label '{}'", id, label), Some(line))
                            .for_chunk(part),
                    );
                    current = None;
                }
                Label::None => match current.as_ref().and_then(|code| entry.texts.get_mut(code)) {
                    Some(existing) => {
                        if !existing.is_empty() {
                            existing.push('\n');
                        }
                        existing.push_str(line.trim());
                    }
                    None => {
                        outcome.issues.push(
                            parse_issue(format!("Entry {} has text without a language label", id), Some(line))
                                .for_chunk(part),
                        );
                    }
                },
            }
        }

        if !entry.has_any_text() {
            outcome.issues.push(
                parse_issue(format!("Entry {} has no text (truncated output?)", id), Some(id_line)).for_chunk(part),
            );
            return;
        }

        outcome.entries.push(entry);
    }

    fn parse_json_items(&self, items: &[Value], part: u32, outcome: &mut ParseOutcome) {
        for (index, item) in items.iter().enumerate() {
            let Some(object) = item.as_object() else {
                outcome.issues.push(parse_issue(format!("JSON item {} is not an object", index + 1), None).for_chunk(part));
                continue;
            };

            let id = object.get("id").and_then(|v| match v {
                Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                Value::String(s) => s.trim().parse::<u32>().ok(),
                _ => None,
            });
            let Some(id) = id else {
                outcome.issues.push(parse_issue(format!("JSON item {} has no valid id", index + 1), None).for_chunk(part));
                continue;
            };

            let mut entry = SubtitleEntry::new(id);
            match json_timing(object) {
                Ok(timing) => entry.timing = timing,
                Err(message) => {
                    outcome.issues.push(parse_issue(format!("Entry {}: {}", id, message), None).for_chunk(part));
                    continue;
                }
            }

            let texts = object.get("texts").and_then(|v| v.as_object()).unwrap_or(object);
            for (key, value) in texts {
                let Some(text) = value.as_str() else { continue };
                if let Some(code) = self.resolve(key) {
                    entry.texts.insert(code, text.trim().to_string());
                }
            }

            if !entry.has_any_text() {
                outcome.issues.push(parse_issue(format!("Entry {} has no text", id), None).for_chunk(part));
                continue;
            }
            outcome.entries.push(entry);
        }
    }
}

fn parse_issue(message: impl Into<String>, context: Option<&str>) -> ProcessingIssue {
    let issue = ProcessingIssue::warning(IssueType::ParseError, message);
    match context {
        Some(line) => issue.with_context(line.trim()),
        None => issue,
    }
}

/// Latest timestamp accepted from model output (100 hours)
const MAX_TIMESTAMP_MS: u64 = 100 * 3_600_000;

fn json_timing(object: &serde_json::Map<String, Value>) -> Result<Option<TimeRange>, String> {
    if let Some(line) = object.get("timing").and_then(|v| v.as_str()) {
        return TimeRange::parse_line(line).map(Some).map_err(|_| format!("malformed timing '{}'", line));
    }

    let field = |name: &str| -> Result<Option<u64>, String> {
        match object.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(|| format!("bad {} value", name)),
            Some(Value::String(s)) => parse_timestamp(s).map(Some).map_err(|_| format!("malformed {} '{}'", name, s)),
            Some(_) => Err(format!("bad {} value", name)),
        }
    };

    match (field("start")?, field("end")?) {
        (Some(start), Some(end)) if start.max(end) > MAX_TIMESTAMP_MS => {
            Err(format!("timestamp beyond {}ms", MAX_TIMESTAMP_MS))
        }
        (Some(start), Some(end)) => Ok(Some(TimeRange::new(start, end))),
        (None, None) => Ok(None),
        _ => Err("only one of start/end given".to_string()),
    }
}

/// Drop markdown code fence lines
fn strip_code_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split into entry blocks: at blank lines, and at an id line that is
/// followed by a timing line or a bracket label inside a running block
fn group_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    for paragraph in split_blocks(text) {
        let mut current: Vec<&str> = Vec::new();
        for (index, line) in paragraph.iter().enumerate() {
            let is_id = !line.trim().is_empty() && line.trim().chars().all(|c| c.is_ascii_digit());
            let next_starts_entry = paragraph
                .get(index + 1)
                .map(|next| TimeRange::looks_like_timing(next) || BRACKET_LABEL.is_match(next))
                .unwrap_or(false);
            if is_id && next_starts_entry && !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            current.push(line);
        }
        if !current.is_empty() {
            blocks.push(current);
        }
    }
    blocks
}
