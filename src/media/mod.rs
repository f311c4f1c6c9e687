/*!
 * Media backend used by the recap pipeline.
 *
 * The pipeline only talks to the `MediaBackend` trait: probing a source,
 * extracting an audio track for diarization, cutting one clip onto a common
 * canvas, and joining the surviving clips with boundary fades into the final
 * render. `FfmpegBackend`
 * implements it with the ffmpeg/ffprobe command line tools.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use crate::errors::MediaError;

pub mod ffmpeg;

pub use ffmpeg::FfmpegBackend;

/// Frame rate used when a source reports none
pub const FALLBACK_FRAMERATE: f64 = 25.0;

/// Stream properties of a source video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    /// Whether the container has at least one audio stream
    pub has_audio: bool,
}

/// Common output geometry every clip is scaled/padded onto
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
}

impl Canvas {
    /// Smallest canvas holding every source: max width, max height, max frame rate.
    /// Dimensions are rounded up to even numbers for yuv420p.
    pub fn covering<'a, I>(infos: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a VideoInfo>,
    {
        let mut canvas: Option<Canvas> = None;
        for info in infos {
            let c = canvas.get_or_insert(Canvas {
                width: 0,
                height: 0,
                framerate: 0.0,
            });
            c.width = c.width.max(info.width);
            c.height = c.height.max(info.height);
            c.framerate = c.framerate.max(info.framerate);
        }

        canvas.map(|c| Canvas {
            width: round_up_even(c.width.max(2)),
            height: round_up_even(c.height.max(2)),
            framerate: if c.framerate > 0.0 { c.framerate } else { FALLBACK_FRAMERATE },
        })
    }
}

fn round_up_even(value: u32) -> u32 {
    value + (value % 2)
}

/// One subclip to cut from a source video
#[derive(Debug, Clone)]
pub struct ClipRequest {
    pub source: PathBuf,
    /// Range start in seconds
    pub start: f64,
    /// Range end in seconds
    pub end: f64,
    pub canvas: Canvas,
    /// Source has an audio stream; otherwise silence is synthesized
    pub has_audio: bool,
    pub output: PathBuf,
}

impl ClipRequest {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// A cut clip placed on the final timeline
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineClip {
    pub path: PathBuf,
    /// Clip length in seconds
    pub duration: f64,
    /// Fade-in length, 0 for none
    pub fade_in: f64,
    /// Fade-out length, 0 for none
    pub fade_out: f64,
}

/// Fixed codec pairing for the final render
#[derive(Debug, Clone, PartialEq)]
pub struct Codecs {
    pub video: String,
    pub audio: String,
}

impl Default for Codecs {
    fn default() -> Self {
        Self {
            video: "libx264".to_string(),
            audio: "aac".to_string(),
        }
    }
}

/// Media operations needed by the recap pipeline
#[async_trait]
pub trait MediaBackend: Send + Sync + Debug {
    /// Open a video and read its stream properties
    async fn probe(&self, path: &Path) -> Result<VideoInfo, MediaError>;

    /// Write the audio track as 16 kHz mono 16-bit PCM WAV
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), MediaError>;

    /// Cut and conform one clip
    async fn extract_clip(&self, request: &ClipRequest) -> Result<(), MediaError>;

    /// Fade and concatenate clips in order, then encode the final video
    async fn render(&self, clips: &[TimelineClip], output: &Path, codecs: &Codecs) -> Result<(), MediaError>;
}
