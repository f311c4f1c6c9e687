/*!
 * Mock capability implementations for testing
 *
 * Stand-ins for the summarizer, the diarizer and the media backend so the
 * pipeline can run end to end without models, services or ffmpeg. Each mock
 * records the calls it receives.
 */

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use recapper::errors::{MediaError, ProviderError};
use recapper::media::{ClipRequest, Codecs, MediaBackend, TimelineClip, VideoInfo};
use recapper::providers::{DiarizedInterval, Diarizer, Summarizer};

/// How the mock summarizer answers
#[derive(Debug, Clone)]
pub enum SummarizerBehavior {
    /// Return the first `count` texts verbatim
    Echo,
    /// Return these phrases regardless of input
    Phrases(Vec<String>),
    /// Fail every call
    Fail,
}

/// Mock summarizer that tracks the requested counts
#[derive(Debug)]
pub struct MockSummarizer {
    behavior: SummarizerBehavior,
    pub calls: Arc<Mutex<Vec<usize>>>,
}

impl MockSummarizer {
    pub fn echo() -> Self {
        Self::with_behavior(SummarizerBehavior::Echo)
    }

    pub fn phrases(phrases: &[&str]) -> Self {
        Self::with_behavior(SummarizerBehavior::Phrases(
            phrases.iter().map(|p| p.to_string()).collect(),
        ))
    }

    pub fn failing() -> Self {
        Self::with_behavior(SummarizerBehavior::Fail)
    }

    fn with_behavior(behavior: SummarizerBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn select(&self, texts: &[String], count: usize) -> Result<Vec<String>, ProviderError> {
        self.calls.lock().unwrap().push(count);
        match &self.behavior {
            SummarizerBehavior::Echo => Ok(texts.iter().take(count).cloned().collect()),
            SummarizerBehavior::Phrases(phrases) => Ok(phrases.clone()),
            SummarizerBehavior::Fail => Err(ProviderError::ConnectionError("mock summarizer down".to_string())),
        }
    }

    fn name(&self) -> String {
        "mock summarizer".to_string()
    }
}

/// Mock diarizer returning the same intervals for every audio file
#[derive(Debug)]
pub struct MockDiarizer {
    intervals: Vec<DiarizedInterval>,
    fail_diarize: bool,
    pub audio_files: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockDiarizer {
    pub fn new(intervals: Vec<DiarizedInterval>) -> Self {
        Self {
            intervals,
            fail_diarize: false,
            audio_files: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Connects fine but fails every diarization request
    pub fn failing_requests() -> Self {
        Self {
            intervals: Vec::new(),
            fail_diarize: true,
            audio_files: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Diarizer for MockDiarizer {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizedInterval>, ProviderError> {
        self.audio_files.lock().unwrap().push(audio_path.to_path_buf());
        if self.fail_diarize {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: "model crashed".to_string(),
            });
        }
        Ok(self.intervals.clone())
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Diarizer whose initialization check always fails
#[derive(Debug, Default)]
pub struct UnavailableDiarizer;

#[async_trait]
impl Diarizer for UnavailableDiarizer {
    async fn diarize(&self, _audio_path: &Path) -> Result<Vec<DiarizedInterval>, ProviderError> {
        panic!("diarize must not be called on an unavailable capability");
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        Err(ProviderError::Unavailable("model weights not found".to_string()))
    }
}

/// Recorded render call
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub clips: Vec<TimelineClip>,
    pub output: PathBuf,
    pub codecs: Codecs,
}

/// In-memory media backend
#[derive(Debug, Default)]
pub struct FakeMediaBackend {
    /// Probe results by video file name; unknown names get `default_info`
    infos: HashMap<String, VideoInfo>,
    unreadable: HashSet<String>,
    failing_clips: HashSet<String>,
    failing_audio: HashSet<String>,
    fail_render: bool,
    render_delay: Duration,
    pub clip_requests: Arc<Mutex<Vec<ClipRequest>>>,
    pub audio_requests: Arc<Mutex<Vec<PathBuf>>>,
    pub renders: Arc<Mutex<Vec<RenderCall>>>,
}

impl FakeMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_info() -> VideoInfo {
        VideoInfo {
            duration_sec: 1800.0,
            width: 1280,
            height: 720,
            framerate: 25.0,
            has_audio: true,
        }
    }

    pub fn with_info(mut self, file_name: &str, info: VideoInfo) -> Self {
        self.infos.insert(file_name.to_string(), info);
        self
    }

    pub fn with_unreadable(mut self, file_name: &str) -> Self {
        self.unreadable.insert(file_name.to_string());
        self
    }

    pub fn with_failing_clips(mut self, file_name: &str) -> Self {
        self.failing_clips.insert(file_name.to_string());
        self
    }

    pub fn with_failing_audio(mut self, file_name: &str) -> Self {
        self.failing_audio.insert(file_name.to_string());
        self
    }

    pub fn with_render_failure(mut self) -> Self {
        self.fail_render = true;
        self
    }

    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    pub fn clip_requests(&self) -> Vec<ClipRequest> {
        self.clip_requests.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<RenderCall> {
        self.renders.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaBackend for FakeMediaBackend {
    async fn probe(&self, path: &Path) -> Result<VideoInfo, MediaError> {
        let name = Self::file_name(path);
        if self.unreadable.contains(&name) {
            return Err(MediaError::Probe(format!("{}: invalid data found when processing input", name)));
        }
        Ok(self.infos.get(&name).cloned().unwrap_or_else(Self::default_info))
    }

    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), MediaError> {
        self.audio_requests.lock().unwrap().push(video.to_path_buf());
        if self.failing_audio.contains(&Self::file_name(video)) {
            return Err(MediaError::Failed {
                tool: "ffmpeg".to_string(),
                stderr: "Output file does not contain any stream".to_string(),
            });
        }
        std::fs::write(output, b"RIFF").map_err(|e| MediaError::Spawn {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })
    }

    async fn extract_clip(&self, request: &ClipRequest) -> Result<(), MediaError> {
        self.clip_requests.lock().unwrap().push(request.clone());
        if self.failing_clips.contains(&Self::file_name(&request.source)) {
            return Err(MediaError::Failed {
                tool: "ffmpeg".to_string(),
                stderr: "Error while decoding stream #0:0".to_string(),
            });
        }
        std::fs::write(&request.output, format!("{:.3}\n", request.duration())).map_err(|e| MediaError::Spawn {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })
    }

    async fn render(&self, clips: &[TimelineClip], output: &Path, codecs: &Codecs) -> Result<(), MediaError> {
        self.renders.lock().unwrap().push(RenderCall {
            clips: clips.to_vec(),
            output: output.to_path_buf(),
            codecs: codecs.clone(),
        });
        if !self.render_delay.is_zero() {
            tokio::time::sleep(self.render_delay).await;
        }
        if self.fail_render {
            return Err(MediaError::Failed {
                tool: "ffmpeg".to_string(),
                stderr: "Conversion failed!".to_string(),
            });
        }

        // the "video" lists the clip durations
        let mut content = String::new();
        for clip in clips {
            content.push_str(&std::fs::read_to_string(&clip.path).map_err(|e| MediaError::Spawn {
                tool: "ffmpeg".to_string(),
                message: e.to_string(),
            })?);
        }
        std::fs::write(output, content).map_err(|e| MediaError::Spawn {
            tool: "ffmpeg".to_string(),
            message: e.to_string(),
        })
    }
}
