/*!
 * Job progress reporting.
 *
 * A run owns one `ProgressReporter`. Every update is:
 * - clamped so the persisted value never decreases within the run,
 * - written atomically to `progress.json` (the record polling clients read),
 * - appended as a line to `recap.log`,
 * - broadcast on a `watch` channel for in-process subscribers.
 *
 * After the terminal record (`done` or `error`) the reporter ignores further
 * updates, so the terminal record is written exactly once.
 *
 * `RunLock` serializes runs against one output area, and `RenderTimer` emits
 * time-based estimates while the encoder runs.
 */

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::errors::RecapError;
use crate::file_utils::FileManager;

pub const PROGRESS_FILE: &str = "progress.json";
pub const LOG_FILE: &str = "recap.log";
pub const LOCK_FILE: &str = ".recap.lock";

/// Progress fractions at pipeline milestones
pub mod milestones {
    pub const INIT: f64 = 0.0;
    pub const INPUTS_DISCOVERED: f64 = 0.05;
    pub const CORPUS_START: f64 = 0.10;
    pub const CORPUS_END: f64 = 0.45;
    pub const SELECTION: f64 = 0.50;
    pub const RENDER_START: f64 = 0.55;
    pub const RENDER_END: f64 = 0.95;
    pub const ARTIFACTS_WRITTEN: f64 = 0.97;
    pub const FINISHED: f64 = 1.0;

    /// Position `done / total` of the way from `from` to `to`
    pub fn between(from: f64, to: f64, done: usize, total: usize) -> f64 {
        if total == 0 {
            return to;
        }
        from + (to - from) * (done.min(total) as f64 / total as f64)
    }
}

/// Job state machine: idle -> running -> done | error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// The persisted progress record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Fraction in [0, 1]
    pub progress: f64,
    pub status: JobStatus,
    #[serde(default, alias = "msg")]
    pub message: String,
    /// Unix time in seconds
    #[serde(default, alias = "ts")]
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl JobProgress {
    /// Record reported when no run has written one
    pub fn idle() -> Self {
        Self {
            progress: 0.0,
            status: JobStatus::Idle,
            message: String::new(),
            timestamp: 0.0,
            run_id: None,
        }
    }

    /// Read the record from an output area; absent means idle
    pub fn read(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(PROGRESS_FILE);
        if !path.exists() {
            return Ok(Self::idle());
        }
        let content = FileManager::read_to_string(&path)?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse progress record: {:?}", path))
    }
}

impl fmt::Display for JobProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3.0}% {}", self.progress * 100.0, self.status)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ReporterState {
    last: f64,
    finished: bool,
}

/// Single writer of the progress record and run log for one run
#[derive(Debug)]
pub struct ProgressReporter {
    progress_path: PathBuf,
    log_path: PathBuf,
    run_id: String,
    state: Mutex<ReporterState>,
    sender: watch::Sender<JobProgress>,
}

impl ProgressReporter {
    pub fn new(output_dir: &Path, run_id: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(JobProgress::idle());
        Self {
            progress_path: output_dir.join(PROGRESS_FILE),
            log_path: output_dir.join(LOG_FILE),
            run_id: run_id.into(),
            state: Mutex::new(ReporterState {
                last: 0.0,
                finished: false,
            }),
            sender,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Follow this run's snapshots
    pub fn subscribe(&self) -> watch::Receiver<JobProgress> {
        self.sender.subscribe()
    }

    /// Last persisted fraction
    pub fn current(&self) -> f64 {
        self.state.lock().last
    }

    /// Clear the previous run's record and log, then enter `running`
    pub fn start(&self, message: &str) -> Result<()> {
        FileManager::remove_if_exists(&self.progress_path)?;
        FileManager::remove_if_exists(&self.log_path)?;

        let mut state = self.state.lock();
        state.last = milestones::INIT;
        state.finished = false;
        self.publish(milestones::INIT, JobStatus::Running, message)
    }

    /// Report a running milestone; lower values are raised to the last one
    pub fn update(&self, progress: f64, message: &str) {
        let mut state = self.state.lock();
        if state.finished {
            debug!("Ignoring progress update after terminal record: {}", message);
            return;
        }
        let value = progress.clamp(0.0, 1.0).max(state.last);
        state.last = value;
        if let Err(e) = self.publish(value, JobStatus::Running, message) {
            warn!("Failed to persist progress: {:#}", e);
        }
    }

    /// Append a log line without moving progress
    pub fn note(&self, message: &str) {
        if let Err(e) = self.append_log(self.current(), message) {
            warn!("Failed to append to run log: {:#}", e);
        }
    }

    /// Write the `done` record; false when a terminal record already exists
    pub fn finish_done(&self, message: &str) -> bool {
        self.finish(JobStatus::Done, message)
    }

    /// Write the `error` record; false when a terminal record already exists
    pub fn finish_error(&self, message: &str) -> bool {
        self.finish(JobStatus::Error, message)
    }

    fn finish(&self, status: JobStatus, message: &str) -> bool {
        let mut state = self.state.lock();
        if state.finished {
            return false;
        }
        state.finished = true;
        state.last = milestones::FINISHED;
        if let Err(e) = self.publish(milestones::FINISHED, status, message) {
            warn!("Failed to persist terminal progress: {:#}", e);
        }
        true
    }

    // Callers hold the state lock, so file order matches value order
    fn publish(&self, progress: f64, status: JobStatus, message: &str) -> Result<()> {
        let record = JobProgress {
            progress,
            status,
            message: message.to_string(),
            timestamp: Utc::now().timestamp_millis() as f64 / 1000.0,
            run_id: Some(self.run_id.clone()),
        };

        let json = serde_json::to_vec_pretty(&record).context("Failed to serialize progress")?;
        FileManager::write_atomic(&self.progress_path, &json)?;
        self.append_log(progress, message)?;
        self.sender.send_replace(record);
        Ok(())
    }

    fn append_log(&self, progress: f64, message: &str) -> Result<()> {
        FileManager::append_to_log_file(
            &self.log_path,
            &format!("[{:>3.0}%] {}", progress * 100.0, message),
        )
    }
}

/// Exclusive ownership of an output area for the duration of a run
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Fails with `AlreadyRunning` while another run holds the lock
    pub fn acquire(output_dir: &Path) -> Result<Self, RecapError> {
        FileManager::ensure_dir(output_dir).map_err(|e| RecapError::File(format!("{:#}", e)))?;
        let path = output_dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(RecapError::AlreadyRunning(path.display().to_string()));
            }
            Err(e) => return Err(RecapError::File(format!("{}: {}", path.display(), e))),
        };
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!("Failed to record owner pid in {:?}: {}", path, e);
        }

        Ok(Self { path })
    }

    /// Whether an output area is currently locked
    pub fn is_held(output_dir: &Path) -> bool {
        output_dir.join(LOCK_FILE).exists()
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release run lock {:?}: {}", self.path, e);
        }
    }
}

/// Periodic render progress estimate, alive only while the encoder runs.
///
/// Reports `from + (to - from) * min(1, elapsed / (expected * 1.2))` on every tick.
pub struct RenderTimer {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Slack factor applied to the expected render time
pub const RENDER_TIME_FACTOR: f64 = 1.2;

/// Shortest tick; `tokio::time::interval` rejects a zero period
const MIN_RENDER_TICK: Duration = Duration::from_millis(1);

impl RenderTimer {
    pub fn start(
        reporter: Arc<ProgressReporter>,
        expected_secs: f64,
        interval: Duration,
        from: f64,
        to: f64,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let started = Instant::now();
        let expected = (expected_secs * RENDER_TIME_FACTOR).max(f64::EPSILON);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_RENDER_TICK));
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let ratio = (started.elapsed().as_secs_f64() / expected).min(1.0);
                        let value = from + (to - from) * ratio;
                        reporter.update(value, &format!("Rendering recap video (~{:.0}%)", ratio * 100.0));
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Signal the timer and wait up to 500 ms for it to exit
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if tokio::time::timeout(Duration::from_millis(500), &mut self.handle).await.is_err() {
            warn!("Render progress timer did not stop in time, aborting it");
            self.handle.abort();
        }
    }
}
