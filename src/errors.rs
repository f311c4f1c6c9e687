/*!
 * Error types for the recapper application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when talking to a summarization or diarization capability
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making a request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing a response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the service itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the service
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The capability could not be initialized
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur while reading subtitle files
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// The subtitle file does not exist
    #[error("Subtitle file not found: {0}")]
    NotFound(String),

    /// The subtitle file could not be read
    #[error("Failed to read subtitle file {path}: {message}")]
    Unreadable {
        /// Path of the subtitle file
        path: String,
        /// Underlying cause
        message: String,
    },

    /// The subtitle file contains no usable cues
    #[error("No usable cues in subtitle file: {0}")]
    NoCues(String),
}

/// Errors raised by the media backend (ffmpeg/ffprobe)
#[derive(Error, Debug)]
pub enum MediaError {
    /// The media tool could not be launched
    #[error("Failed to execute {tool}: {message}")]
    Spawn {
        /// Tool name
        tool: String,
        /// Underlying cause
        message: String,
    },

    /// The media tool exited with an error
    #[error("{tool} failed: {stderr}")]
    Failed {
        /// Tool name
        tool: String,
        /// Filtered stderr output
        stderr: String,
    },

    /// The media tool produced output we could not interpret
    #[error("Unexpected ffprobe output: {0}")]
    Probe(String),

    /// The media tool did not finish in time
    #[error("{tool} timed out after {secs}s")]
    Timeout {
        /// Tool name
        tool: String,
        /// Timeout in seconds
        secs: u64,
    },
}

/// Job-level errors. Every variant except `AlreadyRunning` ends a run in
/// `error` status.
#[derive(Error, Debug)]
pub enum RecapError {
    /// No video files in the input area
    #[error("No video files to process.")]
    NoInputVideos,

    /// Videos exist but none has a subtitle counterpart
    #[error("No video/subtitle pairs found among {videos} video file(s).")]
    NoPairs {
        /// Number of videos considered
        videos: usize,
    },

    /// Pairs exist but none produced a candidate segment
    #[error("No candidate segments could be built from the subtitles.")]
    EmptyCorpus,

    /// Every clip extraction failed
    #[error("No scenes survived clip extraction; nothing to render.")]
    NoSurvivingClips,

    /// The final concatenation/encode failed
    #[error("Failed to render recap video: {0}")]
    Render(String),

    /// Another run holds the run-ownership lock
    #[error("Another recap run is already in progress (lock: {0})")]
    AlreadyRunning(String),

    /// Filesystem failure while writing artifacts or progress
    #[error("File error: {0}")]
    File(String),

    /// The summarization capability failed
    #[error("Summarizer error: {0}")]
    Summarizer(#[from] ProviderError),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// Error from the media backend
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// Error from the recap job
    #[error("Recap error: {0}")]
    Recap(#[from] RecapError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<std::io::Error> for RecapError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
