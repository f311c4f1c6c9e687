use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use regex::Regex;
use once_cell::sync::Lazy;
use anyhow::{Result, Context, anyhow};
use log::{warn, debug};
use serde::{Deserialize, Serialize};
use crate::errors::SubtitleError;

// @module: Subtitle parsing and sentence segmentation

// @const: SRT timestamp regex (comma or dot before milliseconds)
static TIMESTAMP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d{1,2}:\d{2}:\d{2}[,.]\d{3})").unwrap()
});

// @const: Inline markup such as <i>, </font> or {\an8}
static MARKUP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<[^>]*>|\{\\[^}]*\}").unwrap()
});

static WHITESPACE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+").unwrap()
});

/// Characters that may trail a sentence terminator, e.g. `"Stop!"` or `(really?)`
const CLOSING_CHARS: &[char] = &['"', '\'', '\u{201D}', '\u{2019}', '\u{00BB}', ')', ']'];

// @struct: Single subtitle cue
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    // @field: Start time in seconds
    pub start: f64,

    // @field: End time in seconds
    pub end: f64,

    // @field: Cue text, line breaks already folded into spaces
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        SubtitleCue {
            start,
            end,
            text: text.into(),
        }
    }

    /// Parse an SRT timestamp (`HH:MM:SS,mmm`) to seconds
    pub fn parse_timestamp(timestamp: &str) -> Result<f64> {
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

        let total_ms = hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis;
        Ok(total_ms as f64 / 1000.0)
    }

    /// Format seconds as an SRT timestamp (HH:MM:SS,mmm)
    pub fn format_timestamp(seconds: f64) -> String {
        let ms = (seconds.max(0.0) * 1000.0).round() as u64;
        let hours = ms / 3_600_000;
        let minutes = (ms % 3_600_000) / 60_000;
        let secs = (ms % 60_000) / 1_000;
        let millis = ms % 1_000;

        format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

impl fmt::Display for SubtitleCue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} --> {} {}",
            Self::format_timestamp(self.start),
            Self::format_timestamp(self.end),
            self.text
        )
    }
}

/// One sentence of dialogue, merged from one or more consecutive cues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceUnit {
    /// Start of the first merged cue, in seconds
    pub start: f64,
    /// End of the last merged cue, in seconds
    pub end: f64,
    /// Space-joined, whitespace-normalized text
    pub text: String,
    /// File name of the source video
    pub source_file: String,
    /// 1-based ordinal of the source video within the job
    pub file_index: usize,
}

impl SentenceUnit {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Parsed cues of one subtitle file
#[derive(Debug)]
pub struct SubtitleTrack {
    /// Source filename
    pub source_file: PathBuf,

    /// Cues in file order, empty ones removed
    pub cues: Vec<SubtitleCue>,
}

impl SubtitleTrack {
    /// Load and parse an SRT file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SubtitleError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SubtitleError::NotFound(path.display().to_string()));
        }

        let bytes = fs::read(path).map_err(|e| SubtitleError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let content = String::from_utf8_lossy(&bytes);

        let cues = Self::parse_srt_string(&content);
        if cues.is_empty() {
            return Err(SubtitleError::NoCues(path.display().to_string()));
        }

        Ok(SubtitleTrack {
            source_file: path.to_path_buf(),
            cues,
        })
    }

    /// Parse SRT content into cues.
    ///
    /// Malformed blocks are skipped with a warning, and cues whose text is empty
    /// after markup removal and trimming are dropped. Never fails: a file with
    /// nothing usable yields an empty vector.
    pub fn parse_srt_string(content: &str) -> Vec<SubtitleCue> {
        let content = content.trim_start_matches('\u{feff}');
        let mut cues = Vec::new();

        let mut current_times: Option<(f64, f64)> = None;
        let mut current_lines: Vec<String> = Vec::new();
        let mut line_count = 0;

        let flush = |times: Option<(f64, f64)>, lines: &mut Vec<String>, cues: &mut Vec<SubtitleCue>| {
            if let Some((start, end)) = times {
                let text = normalize_cue_text(&lines.join(" "));
                if text.is_empty() {
                    debug!("Dropping empty cue at {}", SubtitleCue::format_timestamp(start));
                } else {
                    cues.push(SubtitleCue::new(start, end, text));
                }
            }
            lines.clear();
        };

        let mut lines = content.lines().peekable();
        while let Some(line) = lines.next() {
            line_count += 1;
            let trimmed = line.trim();

            // Sequence numbers are only recognized right before a timecode
            let is_index = trimmed.parse::<usize>().is_ok()
                && lines.peek().is_some_and(|next| TIMESTAMP_REGEX.is_match(next.trim()));
            if is_index {
                continue;
            }

            if let Some(caps) = TIMESTAMP_REGEX.captures(trimmed) {
                // A new timecode closes whatever block was open, even without a blank line
                flush(current_times.take(), &mut current_lines, &mut cues);
                let times = SubtitleCue::parse_timestamp(&caps[1])
                    .and_then(|start| Ok((start, SubtitleCue::parse_timestamp(&caps[2])?)));
                let (start, end) = match times {
                    Ok(times) => times,
                    Err(e) => {
                        warn!("Bad timecode at line {}, skipping cue: {}", line_count, e);
                        continue;
                    }
                };
                if end < start {
                    warn!("Cue at line {} ends before it starts, skipping", line_count);
                    continue;
                }
                current_times = Some((start, end));
                continue;
            }

            if trimmed.is_empty() {
                flush(current_times.take(), &mut current_lines, &mut cues);
                continue;
            }

            if current_times.is_some() {
                current_lines.push(trimmed.to_string());
            } else {
                warn!("Unexpected text at line {} before timestamp: {}", line_count, trimmed);
            }
        }

        flush(current_times.take(), &mut current_lines, &mut cues);
        cues
    }

    /// Merge cues into sentence units for the given source video
    pub fn into_sentences(self, source_file: &str, file_index: usize) -> Vec<SentenceUnit> {
        segment_cues(&self.cues, source_file, file_index)
    }
}

/// Strip markup and collapse all whitespace (including line breaks) to single spaces
pub fn normalize_cue_text(text: &str) -> String {
    let stripped = MARKUP_REGEX.replace_all(text, " ");
    normalize_whitespace(&stripped)
}

pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

/// Whether text ends a sentence: `.`, `?`, `!` or an ellipsis, ignoring closing quotes/brackets
pub fn ends_sentence(text: &str) -> bool {
    let core = text.trim_end().trim_end_matches(CLOSING_CHARS);
    matches!(core.chars().last(), Some('.' | '?' | '!' | '\u{2026}'))
}

/// Merge consecutive cues into sentence units.
///
/// A buffer grows cue by cue and closes when the last merged cue ends a
/// sentence. A trailing buffer without terminal punctuation is still emitted.
pub fn segment_cues(cues: &[SubtitleCue], source_file: &str, file_index: usize) -> Vec<SentenceUnit> {
    let mut units = Vec::new();
    let mut buffer: Option<SentenceUnit> = None;

    for cue in cues {
        let text = normalize_whitespace(&cue.text);
        if text.is_empty() {
            continue;
        }

        let closes = ends_sentence(&text);
        match buffer.as_mut() {
            Some(unit) => {
                unit.end = cue.end;
                unit.text.push(' ');
                unit.text.push_str(&text);
            }
            None => {
                buffer = Some(SentenceUnit {
                    start: cue.start,
                    end: cue.end,
                    text,
                    source_file: source_file.to_string(),
                    file_index,
                });
            }
        }

        if closes {
            if let Some(unit) = buffer.take() {
                units.push(unit);
            }
        }
    }

    if let Some(unit) = buffer.take() {
        units.push(unit);
    }

    units
}

/// Segment a subtitle file into sentence units.
///
/// An absent or unusable file yields an empty vector; the caller decides
/// whether that skips the owning video.
pub fn segment_file<P: AsRef<Path>>(path: P, source_file: &str, file_index: usize) -> Vec<SentenceUnit> {
    match SubtitleTrack::load(path.as_ref()) {
        Ok(track) => track.into_sentences(source_file, file_index),
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    }
}
