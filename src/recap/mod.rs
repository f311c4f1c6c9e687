/*!
 * Recap generation pipeline.
 *
 * Stages, leaves first:
 * - `speakers`: speaker attribution of sentence units and turn coalescing
 * - `corpus`: input pairing and the ordered candidate corpus
 * - `selector`: summarizer-driven selection under the duration budget
 * - `timeline`: clip extraction, render and artifact writing
 *
 * The job runner in `app_controller` drives these stages in order.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::subtitle_processor::SentenceUnit;

pub mod corpus;
pub mod selector;
pub mod speakers;
pub mod timeline;

/// Speaker label for text that no diarized interval overlaps
pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// Consecutive sentence units attributed to the same speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub text: String,
    pub source_file: String,
    pub file_index: usize,
}

/// The unit of selection: a sentence unit or a speaker turn in a common shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// None when speaker attribution is off
    pub speaker: Option<String>,
    pub source_file: String,
    pub file_index: usize,
}

impl CandidateSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    // @returns: Speaker label, "UNKNOWN" when unattributed
    pub fn speaker_label(&self) -> &str {
        self.speaker.as_deref().unwrap_or(UNKNOWN_SPEAKER)
    }
}

impl From<SentenceUnit> for CandidateSegment {
    fn from(unit: SentenceUnit) -> Self {
        Self {
            start: unit.start,
            end: unit.end,
            text: unit.text,
            speaker: None,
            source_file: unit.source_file,
            file_index: unit.file_index,
        }
    }
}

impl From<SpeakerTurn> for CandidateSegment {
    fn from(turn: SpeakerTurn) -> Self {
        Self {
            start: turn.start,
            end: turn.end,
            text: turn.text,
            speaker: Some(turn.speaker),
            source_file: turn.source_file,
            file_index: turn.file_index,
        }
    }
}

/// A candidate chosen by the selector
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSegment {
    /// 0-based position in the recap
    pub order: usize,
    /// Index of the candidate in the corpus
    pub corpus_index: usize,
    pub segment: CandidateSegment,
}

/// Episode identifier encoded in a `<compilation>_<season>_<episode>` file stem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeId {
    pub compilation: String,
    pub season: String,
    pub episode: String,
}

impl EpisodeId {
    /// Parse from a file name; None unless the stem has exactly three
    /// non-empty `_`-separated parts
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = Path::new(file_name).file_stem()?.to_str()?;
        let parts: Vec<&str> = stem.split('_').collect();
        match parts.as_slice() {
            [compilation, season, episode]
                if !compilation.is_empty() && !season.is_empty() && !episode.is_empty() =>
            {
                Some(Self {
                    compilation: compilation.to_string(),
                    season: season.to_string(),
                    episode: episode.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Persisted scene record in `recap.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecapScene {
    pub file: String,
    pub file_index: usize,
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeId>,
}

impl From<&SelectedSegment> for RecapScene {
    fn from(selected: &SelectedSegment) -> Self {
        let segment = &selected.segment;
        Self {
            file: segment.source_file.clone(),
            file_index: segment.file_index,
            start: segment.start,
            end: segment.end,
            speaker: segment.speaker_label().to_string(),
            text: segment.text.clone(),
            episode: EpisodeId::from_file_name(&segment.source_file),
        }
    }
}

impl fmt::Display for RecapScene {
    /// Transcript line: `<file> [<speaker>]: <text>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.file, self.speaker, self.text)
    }
}

/// Plain-text transcript, one line per scene
pub fn render_transcript(scenes: &[RecapScene]) -> String {
    let mut out = String::new();
    for scene in scenes {
        out.push_str(&scene.to_string());
        out.push('\n');
    }
    out
}
