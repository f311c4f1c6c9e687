/*!
 * Timeline assembly.
 *
 * Selected segments are cut from their sources one by one into a scratch
 * directory inside the output area and conformed to a common canvas. Once the
 * surviving clips are known they are faded at their boundaries and
 * concatenated into the final render. Only scenes whose
 * clip survived are written to the transcript and scene list, and all three
 * artifacts replace the previous ones atomically.
 */

use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::RecapError;
use crate::file_utils::FileManager;
use crate::media::{Canvas, ClipRequest, Codecs, MediaBackend, TimelineClip};
use crate::progress::{milestones, ProgressReporter, RenderTimer};
use crate::recap::corpus::SourceVideo;
use crate::recap::{render_transcript, RecapScene, SelectedSegment};

pub const VIDEO_FILE: &str = "recap.mp4";
pub const TRANSCRIPT_FILE: &str = "recap.txt";
pub const SCENES_FILE: &str = "recap.json";

/// Assembly settings
#[derive(Debug, Clone)]
pub struct AssemblyParams {
    /// Fade length in seconds
    pub transition: f64,
    pub output_dir: PathBuf,
    pub codecs: Codecs,
    /// Tick of the render progress estimate
    pub progress_interval: Duration,
}

/// A segment dropped from the recap because its clip could not be cut
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipFailure {
    pub order: usize,
    pub file: String,
    pub start: f64,
    pub end: f64,
    pub error: String,
}

/// Result of a successful assembly
#[derive(Debug, Clone)]
pub struct Assembly {
    /// Scenes present in the video, in recap order
    pub scenes: Vec<RecapScene>,
    pub failures: Vec<ClipFailure>,
    /// Summed clip duration in seconds
    pub duration: f64,
    pub video_path: PathBuf,
    pub transcript_path: PathBuf,
    pub scenes_path: PathBuf,
}

/// Fade-in/out lengths for surviving clip `index` of `count`.
///
/// No fade-in on the first clip and no fade-out on the last; each fade is at
/// most half the clip so the two never overlap.
pub fn fade_lengths(index: usize, count: usize, clip_duration: f64, transition: f64) -> (f64, f64) {
    let length = transition.max(0.0).min(clip_duration / 2.0);
    let fade_in = if index > 0 { length } else { 0.0 };
    let fade_out = if index + 1 < count { length } else { 0.0 };
    (fade_in, fade_out)
}

/// Output paths of the three recap artifacts
pub fn artifact_paths(output_dir: &Path) -> [PathBuf; 3] {
    [
        output_dir.join(VIDEO_FILE),
        output_dir.join(TRANSCRIPT_FILE),
        output_dir.join(SCENES_FILE),
    ]
}

fn file_error(e: anyhow::Error) -> RecapError {
    RecapError::File(format!("{:#}", e))
}

/// Cut, render and write the recap
pub async fn assemble(
    selected: &[SelectedSegment],
    sources: &BTreeMap<String, SourceVideo>,
    media: &dyn MediaBackend,
    reporter: &Arc<ProgressReporter>,
    params: &AssemblyParams,
) -> Result<Assembly, RecapError> {
    FileManager::ensure_dir(&params.output_dir).map_err(file_error)?;
    // Scratch lives in the output area so the render can be renamed into place
    let scratch = tempfile::Builder::new()
        .prefix(".recap-scratch-")
        .tempdir_in(&params.output_dir)?;

    let canvas = Canvas::covering(
        selected
            .iter()
            .filter_map(|s| sources.get(&s.segment.source_file))
            .map(|source| &source.info),
    )
    .ok_or(RecapError::NoSurvivingClips)?;
    info!("Canvas {}x{} @ {:.3} fps", canvas.width, canvas.height, canvas.framerate);

    let count = selected.len();
    let mut cut: Vec<(PathBuf, f64)> = Vec::new();
    let mut scenes: Vec<RecapScene> = Vec::new();
    let mut failures: Vec<ClipFailure> = Vec::new();
    let mut duration = 0.0;

    for (i, sel) in selected.iter().enumerate() {
        let segment = &sel.segment;
        let output = scratch.path().join(format!("clip_{:04}.mp4", i));

        let result = match sources.get(&segment.source_file) {
            None => Err(format!("source video {} was not probed", segment.source_file)),
            Some(source) => {
                let end = segment.end.min(source.info.duration_sec);
                if end <= segment.start {
                    Err(format!(
                        "range {:.3}-{:.3}s lies outside the video ({:.3}s)",
                        segment.start, segment.end, source.info.duration_sec
                    ))
                } else {
                    let request = ClipRequest {
                        source: source.path.clone(),
                        start: segment.start,
                        end,
                        canvas,
                        has_audio: source.info.has_audio,
                        output: output.clone(),
                    };
                    media
                        .extract_clip(&request)
                        .await
                        .map(|_| end)
                        .map_err(|e| e.to_string())
                }
            }
        };

        match result {
            Ok(end) => {
                let mut scene = RecapScene::from(sel);
                scene.end = end;
                duration += end - segment.start;
                cut.push((output, end - segment.start));
                scenes.push(scene);
            }
            Err(error) => {
                let message = format!(
                    "Clip {}/{} from {} ({:.2}-{:.2}s) dropped: {}",
                    i + 1, count, segment.source_file, segment.start, segment.end, error
                );
                warn!("{}", message);
                reporter.note(&message);
                failures.push(ClipFailure {
                    order: sel.order,
                    file: segment.source_file.clone(),
                    start: segment.start,
                    end: segment.end,
                    error,
                });
            }
        }

        reporter.update(
            milestones::between(milestones::SELECTION, milestones::RENDER_START, i + 1, count),
            &format!("Extracted clip {}/{}", i + 1, count),
        );
    }

    if cut.is_empty() {
        return Err(RecapError::NoSurvivingClips);
    }

    let survivors = cut.len();
    let clips: Vec<TimelineClip> = cut
        .into_iter()
        .enumerate()
        .map(|(position, (path, clip_duration))| {
            let (fade_in, fade_out) = fade_lengths(position, survivors, clip_duration, params.transition);
            TimelineClip {
                path,
                duration: clip_duration,
                fade_in,
                fade_out,
            }
        })
        .collect();

    reporter.update(
        milestones::RENDER_START,
        &format!("Rendering recap video from {} clip(s), {:.1}s", clips.len(), duration),
    );

    let rendered = scratch.path().join(VIDEO_FILE);
    let timer = RenderTimer::start(
        reporter.clone(),
        duration,
        params.progress_interval,
        milestones::RENDER_START,
        milestones::RENDER_END,
    );
    let render_result = media.render(&clips, &rendered, &params.codecs).await;
    timer.stop().await;
    render_result.map_err(|e| RecapError::Render(e.to_string()))?;

    let [video_path, transcript_path, scenes_path] = artifact_paths(&params.output_dir);
    FileManager::replace_file(&rendered, &video_path).map_err(file_error)?;

    let json = serde_json::to_vec_pretty(&scenes)
        .map_err(|e| RecapError::File(format!("Failed to serialize scenes: {}", e)))?;
    FileManager::write_atomic(&scenes_path, &json).map_err(file_error)?;
    FileManager::write_atomic(&transcript_path, render_transcript(&scenes).as_bytes()).map_err(file_error)?;

    reporter.update(
        milestones::ARTIFACTS_WRITTEN,
        &format!("Saved {}, {} and {}", VIDEO_FILE, TRANSCRIPT_FILE, SCENES_FILE),
    );

    Ok(Assembly {
        scenes,
        failures,
        duration,
        video_path,
        transcript_path,
        scenes_path,
    })
}
