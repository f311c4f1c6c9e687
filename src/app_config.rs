use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Length of the fade applied at clip boundaries, in seconds
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,

    /// Upper bound for the summed duration of selected scenes, in seconds
    #[serde(default = "default_max_recap_duration")]
    pub max_recap_duration: u64,

    /// Identifier of the summarization model
    #[serde(default = "default_summarizer_model", alias = "sbert_model")]
    pub summarizer_model: String,

    /// Genre hint supplied by the user (not used by the pipeline)
    #[serde(default)]
    pub genre: String,

    /// Input and output locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Segment selection settings
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Summarization capability settings
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Diarization capability settings
    #[serde(default)]
    pub diarization: DiarizationConfig,

    /// Rendering settings
    #[serde(default)]
    pub render: RenderConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Input/output area of a recap job
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding the episode videos
    #[serde(default = "default_videos_dir")]
    pub videos_dir: PathBuf,

    /// Directory holding one `<video stem>.srt` per video
    #[serde(default = "default_subtitles_dir")]
    pub subtitles_dir: PathBuf,

    /// Directory receiving the recap, metadata, progress record and log
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            videos_dir: default_videos_dir(),
            subtitles_dir: default_subtitles_dir(),
            output_dir: default_output_dir(),
        }
    }
}

/// What to do when a picked candidate would push the recap over budget
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPolicy {
    /// Stop accumulating at the first over-budget candidate
    #[default]
    Stop,
    /// Skip the over-budget candidate and keep evaluating later ones
    Skip,
}

impl std::fmt::Display for BudgetPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

impl std::str::FromStr for BudgetPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "skip" => Ok(Self::Skip),
            _ => Err(anyhow!("Invalid budget policy: {}", s)),
        }
    }
}

/// Segment selection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SelectionConfig {
    /// Maximum number of phrases requested from the summarizer
    #[serde(default = "default_max_segments")]
    pub max_segments: usize,

    /// Greedy packing policy
    #[serde(default)]
    pub budget_policy: BudgetPolicy,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            max_segments: default_max_segments(),
            budget_policy: BudgetPolicy::default(),
        }
    }
}

/// Summarization backend
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummarizerProvider {
    // @provider: In-process term-frequency ranking
    #[default]
    Builtin,
    // @provider: Local Ollama server
    Ollama,
}

impl SummarizerProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Builtin => "Built-in",
            Self::Ollama => "Ollama",
        }
    }
}

/// Summarization capability settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SummarizerConfig {
    /// Which summarizer to use
    #[serde(default)]
    pub provider: SummarizerProvider,

    /// Service URL (Ollama only)
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            provider: SummarizerProvider::default(),
            endpoint: default_ollama_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Policy when a video's audio track cannot be extracted for diarization
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFailurePolicy {
    /// Keep the video, attributing every sentence to "UNKNOWN"
    #[default]
    Unknown,
    /// Exclude the video from the corpus
    Skip,
}

/// Diarization capability settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiarizationConfig {
    /// Whether speaker attribution runs at all
    #[serde(default)]
    pub enabled: bool,

    /// Diarization service URL
    #[serde(default = "default_diarization_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_diarization_timeout_secs")]
    pub timeout_secs: u64,

    /// What to do when audio extraction fails
    #[serde(default)]
    pub on_audio_failure: AudioFailurePolicy,
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_diarization_endpoint(),
            timeout_secs: default_diarization_timeout_secs(),
            on_audio_failure: AudioFailurePolicy::default(),
        }
    }
}

/// Rendering settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenderConfig {
    /// Video encoder for the recap
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Audio encoder for the recap
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Interval between render progress estimates, in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_transition_duration() -> f64 {
    1.0
}

fn default_max_recap_duration() -> u64 {
    120
}

fn default_summarizer_model() -> String {
    "paraphrase-MiniLM-L6-v2".to_string()
}

fn default_videos_dir() -> PathBuf {
    PathBuf::from("IN/videos")
}

fn default_subtitles_dir() -> PathBuf {
    PathBuf::from("IN/subtitles")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("OUT")
}

fn default_max_segments() -> usize {
    20
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_diarization_timeout_secs() -> u64 {
    600 // whole-episode audio
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_diarization_endpoint() -> String {
    "http://localhost:8765".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_progress_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Load configuration from a JSON file, creating it with defaults when absent
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config file: {}", path.display()))?;
            let reader = BufReader::new(file);
            let config: Config = serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            return Ok((config, false));
        }

        let config = Config::default();
        config.save(path)?;
        Ok((config, true))
    }

    /// Save configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize config to JSON")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config to file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if !self.transition_duration.is_finite() || self.transition_duration < 0.0 {
            return Err(anyhow!(
                "transition_duration must be a non-negative number of seconds, got {}",
                self.transition_duration
            ));
        }

        if self.max_recap_duration == 0 {
            return Err(anyhow!("max_recap_duration must be greater than zero"));
        }

        if self.selection.max_segments == 0 {
            return Err(anyhow!("selection.max_segments must be greater than zero"));
        }

        if self.summarizer.provider == SummarizerProvider::Ollama {
            url::Url::parse(&self.summarizer.endpoint)
                .with_context(|| format!("Invalid summarizer endpoint: {}", self.summarizer.endpoint))?;
            if self.summarizer_model.trim().is_empty() {
                return Err(anyhow!("summarizer_model is required for the Ollama summarizer"));
            }
        }

        if self.diarization.enabled {
            url::Url::parse(&self.diarization.endpoint)
                .with_context(|| format!("Invalid diarization endpoint: {}", self.diarization.endpoint))?;
        }

        if self.render.progress_interval_ms == 0 {
            return Err(anyhow!("render.progress_interval_ms must be greater than zero"));
        }

        Ok(())
    }

    /// Recap budget as fractional seconds
    pub fn max_recap_seconds(&self) -> f64 {
        self.max_recap_duration as f64
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            transition_duration: default_transition_duration(),
            max_recap_duration: default_max_recap_duration(),
            summarizer_model: default_summarizer_model(),
            genre: String::new(),
            paths: PathsConfig::default(),
            selection: SelectionConfig::default(),
            summarizer: SummarizerConfig::default(),
            diarization: DiarizationConfig::default(),
            render: RenderConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
