use anyhow::Result;
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::app_config::Config;
use crate::errors::RecapError;
use crate::file_utils::FileManager;
use crate::media::{Codecs, FfmpegBackend, MediaBackend};
use crate::progress::{milestones, JobProgress, ProgressReporter, RunLock, LOCK_FILE};
use crate::providers::diarization::DiarizationCapability;
use crate::providers::{summarizer_from_config, Summarizer};
use crate::recap::corpus::{discover_inputs, CorpusBuilder, FileOutcome};
use crate::recap::selector::{select_segments, SelectionParams};
use crate::recap::timeline::{artifact_paths, assemble, AssemblyParams, ClipFailure};
use crate::recap::RecapScene;

// @module: Job runner for recap generation

/// Summary of a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// One entry per input video, in processing order
    pub files: Vec<FileOutcome>,
    pub candidates: usize,
    pub selected: usize,
    /// Scenes present in the rendered video
    pub scenes: Vec<RecapScene>,
    /// Selected segments whose clip could not be cut
    pub dropped_clips: Vec<ClipFailure>,
    /// Recap duration in seconds
    pub duration: f64,
    pub video_path: PathBuf,
    pub elapsed_secs: f64,
}

/// A run that owns the output area but has not started yet.
///
/// Lets a caller subscribe to progress before the pipeline begins.
pub struct PreparedRun {
    _lock: RunLock,
    reporter: Arc<ProgressReporter>,
}

impl PreparedRun {
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.reporter.subscribe()
    }

    pub fn run_id(&self) -> &str {
        self.reporter.run_id()
    }
}

/// Writes an error record if a run ends without a terminal record (panic or
/// dropped future)
struct TerminalGuard<'a>(&'a ProgressReporter);

impl Drop for TerminalGuard<'_> {
    fn drop(&mut self) {
        if self.0.finish_error("Run aborted unexpectedly") {
            error!("Run {} aborted before completion", self.0.run_id());
        }
    }
}

/// Main application controller for recap generation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Extractive summarization capability
    summarizer: Arc<dyn Summarizer>,
    // @field: Speaker attribution capability, decided at startup
    diarization: DiarizationCapability,
    // @field: Media tooling
    media: Arc<dyn MediaBackend>,
}

impl Controller {
    // @method: Create a controller with the capabilities described by the configuration
    pub async fn with_config(config: Config) -> Result<Self> {
        config.validate()?;

        let summarizer = summarizer_from_config(&config);
        let diarization = DiarizationCapability::from_config(&config.diarization).await;
        match &diarization {
            DiarizationCapability::Off => {}
            DiarizationCapability::Ready(_) => info!("Speaker diarization enabled"),
            DiarizationCapability::Unavailable(cause) => {
                warn!("Speaker diarization unavailable, speakers will be UNKNOWN: {}", cause)
            }
        }

        Ok(Self::with_capabilities(
            config,
            summarizer,
            diarization,
            Arc::new(FfmpegBackend::default()),
        ))
    }

    // @method: Create a controller with injected capabilities
    pub fn with_capabilities(
        config: Config,
        summarizer: Arc<dyn Summarizer>,
        diarization: DiarizationCapability,
        media: Arc<dyn MediaBackend>,
    ) -> Self {
        Self {
            config,
            summarizer,
            diarization,
            media,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.paths.output_dir
    }

    /// Take ownership of the output area; fails while another run holds it
    pub fn prepare_run(&self) -> Result<PreparedRun, RecapError> {
        let lock = RunLock::acquire(self.output_dir())?;
        let run_id = uuid::Uuid::new_v4().to_string();
        Ok(PreparedRun {
            _lock: lock,
            reporter: Arc::new(ProgressReporter::new(self.output_dir(), run_id)),
        })
    }

    /// Run a whole job. `selected_files` restricts it to the named videos.
    pub async fn run(&self, selected_files: Option<Vec<String>>) -> Result<RunReport, RecapError> {
        let prepared = self.prepare_run()?;
        self.execute(prepared, selected_files).await
    }

    /// Run a prepared job to its terminal record
    pub async fn execute(&self, prepared: PreparedRun, selected_files: Option<Vec<String>>) -> Result<RunReport, RecapError> {
        let reporter = prepared.reporter.clone();
        reporter
            .start("Initializing recap job")
            .map_err(|e| RecapError::File(format!("{:#}", e)))?;
        let _guard = TerminalGuard(&reporter);
        let started = Instant::now();

        let result = self.pipeline(&reporter, selected_files.as_deref(), started).await;

        match &result {
            Ok(report) => {
                let message = format!(
                    "Recap complete: {} scene(s), {:.1}s",
                    report.scenes.len(),
                    report.duration
                );
                info!("{}", message);
                reporter.finish_done(&message);
            }
            Err(e) => {
                error!("Recap failed: {}", e);
                reporter.finish_error(&e.to_string());
            }
        }

        drop(prepared);
        result
    }

    async fn pipeline(
        &self,
        reporter: &Arc<ProgressReporter>,
        selected_files: Option<&[String]>,
        started: Instant,
    ) -> Result<RunReport, RecapError> {
        let output_dir = self.output_dir().to_path_buf();

        // prior output is replaced, never merged
        for path in artifact_paths(&output_dir) {
            FileManager::remove_if_exists(&path).map_err(|e| RecapError::File(format!("{:#}", e)))?;
        }

        let pairs = discover_inputs(&self.config.paths, selected_files)?;
        let with_subtitles = pairs.iter().filter(|p| p.has_subtitle()).count();
        reporter.update(
            milestones::INPUTS_DISCOVERED,
            &format!("Found {} video(s), {} with subtitles", pairs.len(), with_subtitles),
        );
        if with_subtitles == 0 {
            return Err(RecapError::NoPairs { videos: pairs.len() });
        }

        let scratch = tempfile::Builder::new()
            .prefix(".recap-audio-")
            .tempdir_in(&output_dir)?;
        let builder = CorpusBuilder::new(
            self.media.as_ref(),
            &self.diarization,
            self.config.diarization.on_audio_failure,
            scratch.path(),
        );
        reporter.update(milestones::CORPUS_START, "Segmenting subtitles");
        let corpus = builder
            .build(&pairs, |done, total, outcome| {
                reporter.update(
                    milestones::between(milestones::CORPUS_START, milestones::CORPUS_END, done, total),
                    &format!("[{}/{}] {}", done, total, outcome),
                );
            })
            .await;
        drop(scratch);

        if corpus.is_empty() {
            return Err(RecapError::EmptyCorpus);
        }

        reporter.update(
            milestones::SELECTION,
            &format!("Selecting scenes from {} candidate(s) with {}", corpus.len(), self.summarizer.name()),
        );
        let params = SelectionParams {
            max_segments: self.config.selection.max_segments,
            budget_secs: self.config.max_recap_seconds(),
            policy: self.config.selection.budget_policy,
        };
        let selected = select_segments(&corpus.candidates, self.summarizer.as_ref(), params).await?;
        if selected.is_empty() {
            // every pick was longer than the budget
            return Err(RecapError::NoSurvivingClips);
        }

        let assembly_params = AssemblyParams {
            transition: self.config.transition_duration,
            output_dir: output_dir.clone(),
            codecs: Codecs {
                video: self.config.render.video_codec.clone(),
                audio: self.config.render.audio_codec.clone(),
            },
            progress_interval: Duration::from_millis(self.config.render.progress_interval_ms),
        };
        let assembly = assemble(&selected, &corpus.sources, self.media.as_ref(), reporter, &assembly_params).await?;

        Ok(RunReport {
            run_id: reporter.run_id().to_string(),
            files: corpus.outcomes,
            candidates: corpus.candidates.len(),
            selected: selected.len(),
            scenes: assembly.scenes,
            dropped_clips: assembly.failures,
            duration: assembly.duration,
            video_path: assembly.video_path,
            elapsed_secs: started.elapsed().as_secs_f64(),
        })
    }

    /// Persisted progress of the last run, idle when there is none
    pub fn status(&self) -> Result<JobProgress> {
        JobProgress::read(self.output_dir())
    }

    /// Empty the output area, see [`clean_output`]
    pub fn clean_output(&self, force: bool) -> Result<usize, RecapError> {
        clean_output(self.output_dir(), force)
    }
}

/// Empty an output area. A held run lock is respected unless `force`, which
/// also removes a stale lock.
pub fn clean_output(output_dir: &Path, force: bool) -> Result<usize, RecapError> {
    if RunLock::is_held(output_dir) && !force {
        return Err(RecapError::AlreadyRunning(output_dir.join(LOCK_FILE).display().to_string()));
    }
    let keep: &[&str] = if force { &[] } else { &[LOCK_FILE] };
    let removed = FileManager::clear_dir(output_dir, keep).map_err(|e| RecapError::File(format!("{:#}", e)))?;
    info!("Removed {} item(s) from {}", removed, output_dir.display());
    Ok(removed)
}
