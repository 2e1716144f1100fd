use std::collections::BTreeMap;
use std::fmt;
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::warn;
use serde::{Deserialize, Serialize};

// @module: Subtitle entries and reference timing tracks

// @const: SRT timing line regex, tolerant of '.' as millisecond separator
pub(crate) static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*-->\s*(\d{1,2}):(\d{2}):(\d{2})[,.](\d{1,3})\s*$")
        .expect("Invalid timestamp regex")
});

/// Parse an SRT timestamp (HH:MM:SS,mmm) to milliseconds
pub fn parse_timestamp(timestamp: &str) -> Result<u64> {
    let parts: Vec<&str> = timestamp.trim().split(&[':', ',', '.'][..]).collect();

    if parts.len() != 4 {
        return Err(anyhow!("Invalid timestamp format: {}", timestamp));
    }

    let hours: u64 = parts[0].parse().context("Failed to parse hours")?;
    let minutes: u64 = parts[1].parse().context("Failed to parse minutes")?;
    let seconds: u64 = parts[2].parse().context("Failed to parse seconds")?;
    let millis: u64 = parts[3].parse().context("Failed to parse milliseconds")?;

    if minutes >= 60 || seconds >= 60 || millis >= 1000 {
        return Err(anyhow!("Invalid time components in timestamp: {}", timestamp));
    }

    hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
        .ok_or_else(|| anyhow!("Timestamp out of range: {}", timestamp))
}

/// Format milliseconds as an SRT timestamp (HH:MM:SS,mmm)
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

fn captures_to_ms(caps: &regex::Captures, start_idx: usize) -> Result<u64> {
    let field = |i: usize| -> Result<u64> {
        caps.get(start_idx + i)
            .ok_or_else(|| anyhow!("Missing timestamp component"))?
            .as_str()
            .parse::<u64>()
            .context("Invalid timestamp component")
    };
    let (hours, minutes, seconds) = (field(0)?, field(1)?, field(2)?);
    if minutes >= 60 || seconds >= 60 {
        return Err(anyhow!("Invalid time components"));
    }
    // "5" after the separator means 500ms, as written by some models
    let millis_raw = caps.get(start_idx + 3).map(|m| m.as_str()).unwrap_or("0");
    let millis = format!("{:0<3}", millis_raw).parse::<u64>().context("Invalid milliseconds")?;
    hours
        .checked_mul(3_600_000)
        .and_then(|ms| ms.checked_add(minutes * 60_000 + seconds * 1_000 + millis))
        .ok_or_else(|| anyhow!("Timestamp out of range"))
}

/// Start and end of a subtitle, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl TimeRange {
    pub fn new(start_ms: u64, end_ms: u64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Parse an SRT timing line such as `00:00:01,000 --> 00:00:02,500`
    pub fn parse_line(line: &str) -> Result<Self> {
        let caps = TIMESTAMP_REGEX
            .captures(line)
            .ok_or_else(|| anyhow!("Not a timing line: {}", line.trim()))?;
        Ok(Self::new(captures_to_ms(&caps, 1)?, captures_to_ms(&caps, 5)?))
    }

    /// True if the line has the shape of a timing line, parseable or not
    pub fn looks_like_timing(line: &str) -> bool {
        line.contains("-->")
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} --> {}", format_timestamp(self.start_ms), format_timestamp(self.end_ms))
    }
}

// @struct: One parsed dual-language subtitle entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    // @field: Id of the reference cue this entry translates
    pub original_id: u32,

    // @field: Explicit timing; absent means "use the reference cue timing"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TimeRange>,

    // @field: Language code -> text
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
}

impl SubtitleEntry {
    pub fn new(original_id: u32) -> Self {
        Self {
            original_id,
            timing: None,
            texts: BTreeMap::new(),
        }
    }

    pub fn with_timing(mut self, start_ms: u64, end_ms: u64) -> Self {
        self.timing = Some(TimeRange::new(start_ms, end_ms));
        self
    }

    pub fn with_text(mut self, language: &str, text: &str) -> Self {
        self.texts.insert(language.to_string(), text.to_string());
        self
    }

    /// Text for a language, if present and non-blank
    pub fn text(&self, language: &str) -> Option<&str> {
        self.texts
            .get(language)
            .map(|t| t.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    /// True if at least one language has non-blank text
    pub fn has_any_text(&self) -> bool {
        self.texts.values().any(|t| !t.trim().is_empty())
    }

    /// Explicit timing, or the timing of the matching reference cue
    pub fn resolve_timing(&self, reference: Option<&ReferenceTrack>) -> Option<TimeRange> {
        self.timing.or_else(|| {
            reference
                .and_then(|r| r.get(self.original_id))
                .map(|cue| cue.timing)
        })
    }
}

impl fmt::Display for SubtitleEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.original_id)?;
        if let Some(timing) = &self.timing {
            writeln!(f, "{}", timing)?;
        }
        for (language, text) in &self.texts {
            writeln!(f, "[{}] {}", language, text)?;
        }
        writeln!(f)
    }
}

/// A cue of the reference timing track
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCue {
    pub id: u32,
    pub timing: TimeRange,
    pub text: String,
}

/// Source-language timing track a chunk is translated against
#[derive(Debug, Clone, Default)]
pub struct ReferenceTrack {
    pub cues: Vec<ReferenceCue>,
}

impl ReferenceTrack {
    /// Parse SRT content, skipping malformed cues
    pub fn parse_srt(content: &str) -> Self {
        let mut cues = Vec::new();

        for (block_index, block) in split_blocks(content).iter().enumerate() {
            let mut lines = block.iter();
            let Some(id_line) = lines.next() else { continue };
            let Ok(id) = id_line.trim().parse::<u32>() else {
                warn!("Skipping reference cue {}: bad id line '{}'", block_index + 1, id_line.trim());
                continue;
            };
            let Some(timing_line) = lines.next() else {
                warn!("Skipping reference cue {}: missing timing line", id);
                continue;
            };
            let timing = match TimeRange::parse_line(timing_line) {
                Ok(timing) => timing,
                Err(e) => {
                    warn!("Skipping reference cue {}: {}", id, e);
                    continue;
                }
            };
            let text = lines.map(|l| l.trim()).collect::<Vec<_>>().join("\n");
            cues.push(ReferenceCue { id, timing, text });
        }

        Self { cues }
    }

    pub fn get(&self, id: u32) -> Option<&ReferenceCue> {
        self.cues.iter().find(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.cues.iter().map(|c| c.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }
}

/// Split text into blank-line separated blocks of non-empty lines
pub(crate) fn split_blocks(content: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}
