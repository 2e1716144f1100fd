/*!
 * Prompt templates for dual-language subtitle generation.
 *
 * A template is plain text with `{placeholder}` markers. The default one asks
 * the model for the block format understood by `translation::parser`.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::language_utils;
use crate::report::issues::{IssueType, ProcessingIssue};

/// Substituted when a chunk has no reference timing track
pub const NO_REFERENCE_PLACEHOLDER: &str = "(no reference timing available)";

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\w+)\}").expect("Invalid placeholder regex"));

/// Prompt template with placeholders
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// The default template for dual-language subtitle generation.
    pub const DUAL_SUBTITLES: &'static str = r#"You are an expert subtitle editor producing {source_language}/{target_language} dual-language subtitles.

## Input
The transcript below is in {source_language}. The reference track lists the numbered
{source_language} subtitle cues with their timing.

## Task
For every reference cue, write one block:
- first line: the cue number
- second line: the timing, copied from the reference cue (HH:MM:SS,mmm --> HH:MM:SS,mmm)
- a line `[{source_code}] ` followed by the corrected {source_language} text
- a line `[{target_code}] ` followed by the {target_language} translation

Separate blocks with a blank line. Keep cue numbers and timings unchanged, never merge
or skip cues, and output nothing but the blocks.

## Example
1
00:00:01,000 --> 00:00:03,200
[{source_code}] ...
[{target_code}] ...

## Reference track
{reference}

## Transcript
{transcript}
"#;

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default dual-language template.
    pub fn dual_subtitles() -> Self {
        Self::new(Self::DUAL_SUBTITLES)
    }

    /// Render the template with the given variables.
    ///
    /// Substitution is a single pass over the template, so markers inside the
    /// substituted values are left as they are. Unknown markers are kept.
    pub fn render(&self, vars: &TemplateVars<'_>) -> String {
        PLACEHOLDER_REGEX
            .replace_all(&self.template, |caps: &Captures| {
                match vars.lookup(&caps[1]) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::dual_subtitles()
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub source_language: &'a str,
    pub source_code: &'a str,
    pub target_language: &'a str,
    pub target_code: &'a str,
    pub reference: &'a str,
    pub transcript: &'a str,
}

impl<'a> TemplateVars<'a> {
    /// Value for a placeholder name, if it is one of ours
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "source_language" => Some(self.source_language),
            "source_code" => Some(self.source_code),
            "target_language" => Some(self.target_language),
            "target_code" => Some(self.target_code),
            "reference" => Some(self.reference),
            "transcript" => Some(self.transcript),
            _ => None,
        }
    }
}

/// A rendered prompt and the warnings produced while building it
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    pub warnings: Vec<ProcessingIssue>,
}

/// Builds the prompt of a chunk
///
/// Pure: the caller reads inputs and persists the result.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PromptTemplate,
    source_code: String,
    target_codes: Vec<String>,
}

impl PromptBuilder {
    pub fn new(template: PromptTemplate, source_code: impl Into<String>, target_codes: Vec<String>) -> Self {
        Self {
            template,
            source_code: source_code.into(),
            target_codes,
        }
    }

    /// The language a prompt asks for; only the first configured target is used
    pub fn target_code(&self) -> &str {
        self.target_codes.first().map(|s| s.as_str()).unwrap_or("en")
    }

    /// Render the prompt for one chunk
    ///
    /// A missing or blank transcript is a `PromptGenError`. A missing reference
    /// track is a warning and a placeholder is substituted.
    pub fn build(
        &self,
        part: u32,
        transcript: Option<&str>,
        reference: Option<&str>,
    ) -> Result<BuiltPrompt, ProcessingIssue> {
        let transcript = match transcript.map(str::trim) {
            Some(text) if !text.is_empty() => text,
            Some(_) => {
                return Err(ProcessingIssue::error(IssueType::PromptGenError, "Source transcript is empty")
                    .for_chunk(part));
            }
            None => {
                return Err(ProcessingIssue::error(IssueType::PromptGenError, "Source transcript is missing")
                    .for_chunk(part));
            }
        };

        let mut warnings = Vec::new();

        let reference = match reference.map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => {
                warnings.push(
                    ProcessingIssue::warning(IssueType::PromptGenError, "Reference timing track missing; prompt built without it")
                        .for_chunk(part),
                );
                NO_REFERENCE_PLACEHOLDER
            }
        };

        if self.target_codes.len() > 1 {
            warnings.push(
                ProcessingIssue::warning(
                    IssueType::PromptGenError,
                    format!(
                        "{} target languages configured; only '{}' is requested",
                        self.target_codes.len(),
                        self.target_code()
                    ),
                )
                .for_chunk(part),
            );
        }

        let source_language = language_utils::display_name(&self.source_code);
        let target_language = language_utils::display_name(self.target_code());
        let text = self.template.render(&TemplateVars {
            source_language: &source_language,
            source_code: &self.source_code,
            target_language: &target_language,
            target_code: self.target_code(),
            reference,
            transcript,
        });

        debug!("Built prompt for part {} ({} chars)", part, text.len());
        Ok(BuiltPrompt { text, warnings })
    }
}
