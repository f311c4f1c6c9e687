use async_trait::async_trait;
use log::{debug, error};
use serde_json::Value;
use std::ffi::OsString;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

use crate::errors::MediaError;
use crate::media::{ClipRequest, Codecs, MediaBackend, TimelineClip, VideoInfo};

// @const: Per-invocation time limits
const PROBE_TIMEOUT_SECS: u64 = 60;
const AUDIO_TIMEOUT_SECS: u64 = 900;
const CLIP_TIMEOUT_SECS: u64 = 300;
const RENDER_TIMEOUT_SECS: u64 = 3600;

/// Sample rate expected by the diarization service
pub const DIARIZATION_SAMPLE_RATE: u32 = 16_000;

// @const: Audio layout shared by every clip so the concat filter sees uniform streams
const CLIP_AUDIO_RATE: u32 = 48_000;
const CLIP_AUDIO_LAYOUT: &str = "stereo";

/// MediaBackend implemented with the ffmpeg and ffprobe executables
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegBackend {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Run a tool to completion with a time limit; the child is killed when the
    /// limit elapses
    async fn run(&self, program: &str, args: Vec<OsString>, timeout_secs: u64) -> Result<Output, MediaError> {
        debug!("{} {}", program, args.iter().map(|a| a.to_string_lossy()).collect::<Vec<_>>().join(" "));

        let future = Command::new(program)
            .args(&args)
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            result = future => {
                result.map_err(|e| MediaError::Spawn {
                    tool: program.to_string(),
                    message: e.to_string(),
                })?
            },
            _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
                return Err(MediaError::Timeout { tool: program.to_string(), secs: timeout_secs });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let filtered = filter_ffmpeg_stderr(&stderr);
            error!("{} failed: {}", program, filtered);
            return Err(MediaError::Failed {
                tool: program.to_string(),
                stderr: filtered,
            });
        }

        Ok(output)
    }

    fn base_args() -> Vec<OsString> {
        ["-y", "-hide_banner", "-nostdin", "-loglevel", "error"]
            .iter()
            .map(OsString::from)
            .collect()
    }

    /// ffmpeg arguments for one conformed clip
    pub fn clip_args(request: &ClipRequest) -> Vec<OsString> {
        let duration = request.duration();
        let canvas = &request.canvas;
        let mut args = Self::base_args();

        args.push("-ss".into());
        args.push(format!("{:.3}", request.start).into());
        args.push("-t".into());
        args.push(format!("{:.3}", duration).into());
        args.push("-i".into());
        args.push(request.source.as_os_str().to_owned());

        if !request.has_audio {
            args.extend(["-f", "lavfi", "-t"].iter().map(OsString::from));
            args.push(format!("{:.3}", duration).into());
            args.push("-i".into());
            args.push(format!("anullsrc=channel_layout={}:sample_rate={}", CLIP_AUDIO_LAYOUT, CLIP_AUDIO_RATE).into());
        }

        let video_filters = vec![
            format!(
                "scale={w}:{h}:force_original_aspect_ratio=decrease",
                w = canvas.width,
                h = canvas.height
            ),
            format!("pad={w}:{h}:(ow-iw)/2:(oh-ih)/2", w = canvas.width, h = canvas.height),
            "setsar=1".to_string(),
            format!("fps={:.3}", canvas.framerate),
        ];
        let audio_filters = vec![format!(
            "aresample={},aformat=channel_layouts={}",
            CLIP_AUDIO_RATE, CLIP_AUDIO_LAYOUT
        )];

        args.push("-map".into());
        args.push("0:v:0".into());
        args.push("-map".into());
        args.push(if request.has_audio { "0:a:0" } else { "1:a:0" }.into());
        args.push("-vf".into());
        args.push(video_filters.join(",").into());
        args.push("-af".into());
        args.push(audio_filters.join(",").into());

        args.extend(
            [
                "-c:v", "libx264",
                "-preset", "veryfast",
                "-crf", "18",
                "-pix_fmt", "yuv420p",
                "-c:a", "aac",
                "-b:a", "192k",
                "-avoid_negative_ts", "make_zero",
            ]
            .iter()
            .map(OsString::from),
        );
        args.push(request.output.as_os_str().to_owned());
        args
    }

    /// Filter graph fading each clip at its boundaries and joining them in order
    pub fn render_filter(clips: &[TimelineClip]) -> String {
        let mut graph = String::new();
        let mut pads = String::new();

        for (i, clip) in clips.iter().enumerate() {
            let mut video = Vec::new();
            let mut audio = Vec::new();
            if clip.fade_in > 0.0 {
                video.push(format!("fade=t=in:st=0:d={:.3}", clip.fade_in));
                audio.push(format!("afade=t=in:st=0:d={:.3}", clip.fade_in));
            }
            if clip.fade_out > 0.0 {
                let start = (clip.duration - clip.fade_out).max(0.0);
                video.push(format!("fade=t=out:st={:.3}:d={:.3}", start, clip.fade_out));
                audio.push(format!("afade=t=out:st={:.3}:d={:.3}", start, clip.fade_out));
            }
            let video = if video.is_empty() { "null".to_string() } else { video.join(",") };
            let audio = if audio.is_empty() { "anull".to_string() } else { audio.join(",") };

            graph.push_str(&format!("[{i}:v:0]{video}[v{i}];[{i}:a:0]{audio}[a{i}];"));
            pads.push_str(&format!("[v{i}][a{i}]"));
        }

        graph.push_str(&format!("{}concat=n={}:v=1:a=1[outv][outa]", pads, clips.len()));
        graph
    }

    /// ffmpeg arguments for the final render
    pub fn render_args(clips: &[TimelineClip], output: &Path, codecs: &Codecs) -> Vec<OsString> {
        let mut args = Self::base_args();
        for clip in clips {
            args.push("-i".into());
            args.push(clip.path.as_os_str().to_owned());
        }
        args.push("-filter_complex".into());
        args.push(Self::render_filter(clips).into());
        args.extend(["-map", "[outv]", "-map", "[outa]"].iter().map(OsString::from));
        args.push("-c:v".into());
        args.push(codecs.video.clone().into());
        args.extend(["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"].iter().map(OsString::from));
        args.push("-c:a".into());
        args.push(codecs.audio.clone().into());
        args.extend(["-b:a", "192k", "-movflags", "+faststart"].iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> Result<VideoInfo, MediaError> {
        let args: Vec<OsString> = vec![
            "-v".into(), "quiet".into(),
            "-print_format".into(), "json".into(),
            "-show_format".into(),
            "-show_streams".into(),
            path.as_os_str().to_owned(),
        ];
        let output = self.run(&self.ffprobe_path, args, PROBE_TIMEOUT_SECS).await?;
        parse_probe_output(&output.stdout)
    }

    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<(), MediaError> {
        let mut args = Self::base_args();
        args.push("-i".into());
        args.push(video.as_os_str().to_owned());
        args.push("-vn".into());
        args.push("-ac".into());
        args.push("1".into());
        args.push("-ar".into());
        args.push(DIARIZATION_SAMPLE_RATE.to_string().into());
        args.push("-c:a".into());
        args.push("pcm_s16le".into());
        args.push(output.as_os_str().to_owned());

        self.run(&self.ffmpeg_path, args, AUDIO_TIMEOUT_SECS).await?;
        Ok(())
    }

    async fn extract_clip(&self, request: &ClipRequest) -> Result<(), MediaError> {
        let args = Self::clip_args(request);
        self.run(&self.ffmpeg_path, args, CLIP_TIMEOUT_SECS).await?;

        // ffmpeg can exit 0 with an empty file when the range lies past the end
        match tokio::fs::metadata(&request.output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(MediaError::Failed {
                tool: self.ffmpeg_path.clone(),
                stderr: format!("no output written for {}", request.output.display()),
            }),
        }
    }

    async fn render(&self, clips: &[TimelineClip], output: &Path, codecs: &Codecs) -> Result<(), MediaError> {
        let args = Self::render_args(clips, output, codecs);
        self.run(&self.ffmpeg_path, args, RENDER_TIMEOUT_SECS).await?;
        Ok(())
    }
}

/// Parse `ffprobe -show_format -show_streams` JSON
pub fn parse_probe_output(stdout: &[u8]) -> Result<VideoInfo, MediaError> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::Probe(e.to_string()))?;

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| MediaError::Probe("no streams".to_string()))?;

    let video = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| MediaError::Probe("no video stream found".to_string()))?;
    let has_audio = streams.iter().any(|s| s["codec_type"].as_str() == Some("audio"));

    let width = video["width"].as_u64().unwrap_or(0) as u32;
    let height = video["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(MediaError::Probe("video stream has no dimensions".to_string()));
    }

    // Prefer avg_frame_rate; r_frame_rate can report field rate
    let framerate = [&video["avg_frame_rate"], &video["r_frame_rate"]]
        .iter()
        .filter_map(|v| v.as_str())
        .map(parse_framerate)
        .find(|fps| *fps > 0.0)
        .unwrap_or(0.0);

    let duration_sec = json["format"]["duration"]
        .as_str()
        .or_else(|| video["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    if duration_sec <= 0.0 {
        return Err(MediaError::Probe("unknown duration".to_string()));
    }

    Ok(VideoInfo {
        duration_sec,
        width,
        height,
        framerate,
        has_audio,
    })
}

/// Parse an ffprobe rate such as "30000/1001" or "25"
pub fn parse_framerate(fps: &str) -> f64 {
    if let Some((num, den)) = fps.split_once('/') {
        let num: f64 = num.parse().unwrap_or(0.0);
        let den: f64 = den.parse().unwrap_or(0.0);
        return if den != 0.0 { num / den } else { 0.0 };
    }
    fps.parse().unwrap_or(0.0)
}

/// Filter ffmpeg stderr to meaningful error lines, dropping the version
/// banner, build configuration and stream metadata noise.
fn filter_ffmpeg_stderr(stderr: &str) -> String {
    const NOISE_PREFIXES: [&str; 12] = [
        "ffmpeg version",
        "ffprobe version",
        "built with",
        "configuration:",
        "lib",
        "Input #",
        "Metadata:",
        "Duration:",
        "Stream #",
        "Output #",
        "Stream mapping:",
        "Press [q]",
    ];

    let meaningful: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !NOISE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if meaningful.is_empty() {
        "unknown error (stderr was empty after filtering)".to_string()
    } else {
        meaningful.join("\n")
    }
}
