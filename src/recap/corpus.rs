/*!
 * Candidate corpus builder.
 *
 * Pairs each input video with `<subtitles_dir>/<video stem>.srt`, segments the
 * subtitles, optionally attributes speakers, and concatenates everything into
 * one candidate sequence in file-name order. Per-file problems never abort the
 * run: each file ends with a `FileOutcome` explaining what happened to it.
 */

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::app_config::{AudioFailurePolicy, PathsConfig};
use crate::errors::{RecapError, SubtitleError};
use crate::file_utils::FileManager;
use crate::media::{MediaBackend, VideoInfo};
use crate::providers::diarization::DiarizationCapability;
use crate::recap::speakers::attribute_and_coalesce;
use crate::recap::CandidateSegment;
use crate::subtitle_processor::{SentenceUnit, SubtitleTrack};

/// One input video and its expected subtitle
#[derive(Debug, Clone, PartialEq)]
pub struct InputPair {
    /// Video file name, used as the source identifier everywhere downstream
    pub file_name: String,
    /// 1-based position in processing order
    pub file_index: usize,
    pub video: PathBuf,
    pub subtitle: PathBuf,
}

impl InputPair {
    pub fn has_subtitle(&self) -> bool {
        FileManager::file_exists(&self.subtitle)
    }
}

/// Why a video contributed nothing to the corpus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    MissingSubtitle,
    UnreadableSubtitle(String),
    NoCues,
    VideoUnreadable(String),
    AudioExtractionFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSubtitle => write!(f, "subtitle file is missing"),
            Self::UnreadableSubtitle(e) => write!(f, "subtitle file is unreadable: {}", e),
            Self::NoCues => write!(f, "subtitle file has no usable cues"),
            Self::VideoUnreadable(e) => write!(f, "video could not be opened: {}", e),
            Self::AudioExtractionFailed(e) => write!(f, "audio extraction failed: {}", e),
        }
    }
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Included {
        candidates: usize,
        /// Set when speaker attribution fell back to "UNKNOWN" for this file
        #[serde(skip_serializing_if = "Option::is_none")]
        degraded: Option<String>,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// Per-file result accumulated into the run report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    pub file_index: usize,
    #[serde(flatten)]
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn is_included(&self) -> bool {
        matches!(self.status, FileStatus::Included { .. })
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            FileStatus::Included { candidates, degraded: None } => {
                write!(f, "{}: {} candidate segment(s)", self.file_name, candidates)
            }
            FileStatus::Included { candidates, degraded: Some(note) } => write!(
                f,
                "{}: {} candidate segment(s), speakers unknown ({})",
                self.file_name, candidates, note
            ),
            FileStatus::Skipped { reason } => write!(f, "{}: skipped, {}", self.file_name, reason),
        }
    }
}

/// Probed source video referenced by candidates
#[derive(Debug, Clone, PartialEq)]
pub struct SourceVideo {
    pub path: PathBuf,
    pub info: VideoInfo,
}

/// Ordered candidates plus what the assembler needs to cut them
#[derive(Debug, Default)]
pub struct Corpus {
    pub candidates: Vec<CandidateSegment>,
    /// Keyed by video file name
    pub sources: BTreeMap<String, SourceVideo>,
    pub outcomes: Vec<FileOutcome>,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}

/// List the job's input pairs in file-name order.
///
/// `selected` restricts the run to the named video files; `None` means every
/// video in the input area.
pub fn discover_inputs(paths: &PathsConfig, selected: Option<&[String]>) -> Result<Vec<InputPair>, RecapError> {
    let mut videos = if FileManager::dir_exists(&paths.videos_dir) {
        FileManager::list_videos(&paths.videos_dir)
            .map_err(|e| RecapError::File(format!("{:#}", e)))?
    } else {
        warn!("Video directory does not exist: {}", paths.videos_dir.display());
        Vec::new()
    };

    if let Some(names) = selected {
        for name in names {
            if !videos.iter().any(|v| v.file_name().is_some_and(|f| f.to_string_lossy() == name.as_str())) {
                warn!("Requested video not found: {}", name);
            }
        }
        videos.retain(|v| {
            v.file_name()
                .is_some_and(|f| names.iter().any(|n| f.to_string_lossy() == n.as_str()))
        });
    }

    if videos.is_empty() {
        return Err(RecapError::NoInputVideos);
    }

    Ok(videos
        .into_iter()
        .enumerate()
        .map(|(i, video)| {
            let file_name = video
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default();
            let stem = video
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            InputPair {
                file_name,
                file_index: i + 1,
                subtitle: paths.subtitles_dir.join(format!("{}.srt", stem)),
                video,
            }
        })
        .collect())
}

/// Builds the candidate corpus file by file
pub struct CorpusBuilder<'a> {
    media: &'a dyn MediaBackend,
    diarization: &'a DiarizationCapability,
    on_audio_failure: AudioFailurePolicy,
    scratch_dir: &'a Path,
}

impl<'a> CorpusBuilder<'a> {
    pub fn new(
        media: &'a dyn MediaBackend,
        diarization: &'a DiarizationCapability,
        on_audio_failure: AudioFailurePolicy,
        scratch_dir: &'a Path,
    ) -> Self {
        Self {
            media,
            diarization,
            on_audio_failure,
            scratch_dir,
        }
    }

    /// Process pairs strictly in order; `on_file(done, total, outcome)` is
    /// called after each file
    pub async fn build<F>(&self, pairs: &[InputPair], mut on_file: F) -> Corpus
    where
        F: FnMut(usize, usize, &FileOutcome),
    {
        let mut corpus = Corpus::default();
        let total = pairs.len();

        for (i, pair) in pairs.iter().enumerate() {
            let status = match self.process(pair).await {
                Ok((source, candidates, degraded)) => {
                    let count = candidates.len();
                    corpus.sources.insert(pair.file_name.clone(), source);
                    corpus.candidates.extend(candidates);
                    FileStatus::Included { candidates: count, degraded }
                }
                Err(reason) => FileStatus::Skipped { reason },
            };

            let outcome = FileOutcome {
                file_name: pair.file_name.clone(),
                file_index: pair.file_index,
                status,
            };
            if outcome.is_included() {
                info!("[{}/{}] {}", i + 1, total, outcome);
            } else {
                warn!("[{}/{}] {}", i + 1, total, outcome);
            }
            on_file(i + 1, total, &outcome);
            corpus.outcomes.push(outcome);
        }

        corpus
    }

    async fn process(
        &self,
        pair: &InputPair,
    ) -> Result<(SourceVideo, Vec<CandidateSegment>, Option<String>), SkipReason> {
        let units = load_units(pair)?;

        let info = self
            .media
            .probe(&pair.video)
            .await
            .map_err(|e| SkipReason::VideoUnreadable(e.to_string()))?;
        let source = SourceVideo {
            path: pair.video.clone(),
            info,
        };

        let (candidates, degraded) = match self.diarization {
            DiarizationCapability::Off => (units.into_iter().map(CandidateSegment::from).collect(), None),
            DiarizationCapability::Unavailable(cause) => {
                (unknown_turns(&units), Some(format!("diarization unavailable: {}", cause)))
            }
            DiarizationCapability::Ready(diarizer) => {
                let audio = self.scratch_dir.join(format!("audio_{:04}.wav", pair.file_index));
                if let Err(e) = self.media.extract_audio(&pair.video, &audio).await {
                    match self.on_audio_failure {
                        AudioFailurePolicy::Skip => return Err(SkipReason::AudioExtractionFailed(e.to_string())),
                        AudioFailurePolicy::Unknown => {
                            return Ok((source, unknown_turns(&units), Some(format!("audio extraction failed: {}", e))));
                        }
                    }
                }

                let result = diarizer.diarize(&audio).await;
                let _ = std::fs::remove_file(&audio);
                match result {
                    Ok(intervals) => {
                        debug!("{}: {} diarized interval(s)", pair.file_name, intervals.len());
                        let turns = attribute_and_coalesce(&units, &intervals);
                        (turns.into_iter().map(CandidateSegment::from).collect(), None)
                    }
                    Err(e) => (unknown_turns(&units), Some(format!("diarization failed: {}", e))),
                }
            }
        };

        Ok((source, candidates, degraded))
    }
}

fn unknown_turns(units: &[SentenceUnit]) -> Vec<CandidateSegment> {
    attribute_and_coalesce(units, &[])
        .into_iter()
        .map(CandidateSegment::from)
        .collect()
}

fn load_units(pair: &InputPair) -> Result<Vec<SentenceUnit>, SkipReason> {
    if !pair.has_subtitle() {
        return Err(SkipReason::MissingSubtitle);
    }
    match SubtitleTrack::load(&pair.subtitle) {
        Ok(track) => {
            let units = track.into_sentences(&pair.file_name, pair.file_index);
            if units.is_empty() {
                Err(SkipReason::NoCues)
            } else {
                Ok(units)
            }
        }
        Err(SubtitleError::NotFound(_)) => Err(SkipReason::MissingSubtitle),
        Err(SubtitleError::NoCues(_)) => Err(SkipReason::NoCues),
        Err(e @ SubtitleError::Unreadable { .. }) => Err(SkipReason::UnreadableSubtitle(e.to_string())),
    }
}
