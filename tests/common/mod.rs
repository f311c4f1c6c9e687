/*!
 * Common test utilities for the recapper test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use recapper::app_config::Config;
use recapper::providers::diarization::DiarizationCapability;
use recapper::providers::Summarizer;
use recapper::Controller;

// Re-export the mock providers module
pub mod mock_providers;

use mock_providers::FakeMediaBackend;

/// Route library logs to the test output (RUST_LOG=debug to see them)
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Format seconds as an SRT timestamp
pub fn srt_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000
    )
}

/// Build SRT content from (start, end, text) cues
pub fn srt_content(cues: &[(f64, f64, &str)]) -> String {
    cues.iter()
        .enumerate()
        .map(|(i, (start, end, text))| {
            format!("{}\n{} --> {}\n{}\n\n", i + 1, srt_time(*start), srt_time(*end), text)
        })
        .collect()
}

/// Creates a sample subtitle file for testing
pub fn create_test_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    let content = srt_content(&[
        (1.0, 4.0, "This is a test subtitle."),
        (5.0, 7.0, "It contains"),
        (7.0, 9.0, "multiple entries."),
        (10.0, 14.0, "For testing purposes"),
    ]);
    create_test_file(dir, filename, &content)
}

/// Two three-second sentences that are unique to episode `n`
pub fn episode_cues(n: usize) -> Vec<(f64, f64, String)> {
    vec![
        (1.0, 4.0, format!("In episode {} the ship left the harbor.", n)),
        (5.0, 8.0, format!("Captain number {} swore we would never return.", n)),
    ]
}

/// Percentages of a run log, in line order (`[timestamp] [ 55%] message`)
pub fn log_percentages(path: &Path) -> Result<Vec<u32>> {
    let content = fs::read_to_string(path)?;
    let mut values = Vec::new();
    for line in content.lines() {
        let Some(open) = line.find("] [") else { continue };
        let rest = &line[open + 3..];
        let Some(close) = rest.find("%]") else { continue };
        values.push(rest[..close].trim().parse()?);
    }
    Ok(values)
}

/// Names of the entries of a directory, sorted
pub fn dir_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
        .collect::<std::io::Result<_>>()?;
    names.sort();
    Ok(names)
}

/// Input/output area in a temp directory with a config pointing at it
pub struct Workspace {
    pub dir: TempDir,
    pub config: Config,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = create_temp_dir()?;
        let mut config = Config::default();
        config.paths.videos_dir = dir.path().join("IN").join("videos");
        config.paths.subtitles_dir = dir.path().join("IN").join("subtitles");
        config.paths.output_dir = dir.path().join("OUT");
        config.render.progress_interval_ms = 5;
        fs::create_dir_all(&config.paths.videos_dir)?;
        fs::create_dir_all(&config.paths.subtitles_dir)?;
        Ok(Self { dir, config })
    }

    /// Add a (placeholder) video and, when given, its subtitle file
    pub fn add_episode(&self, video_name: &str, cues: Option<&[(f64, f64, &str)]>) -> Result<()> {
        create_test_file(&self.config.paths.videos_dir, video_name, "not really a video")?;
        if let Some(cues) = cues {
            let stem = Path::new(video_name)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            create_test_file(&self.config.paths.subtitles_dir, &format!("{}.srt", stem), &srt_content(cues))?;
        }
        Ok(())
    }

    /// Add a video with the subtitles of [`episode_cues`]
    pub fn add_numbered_episode(&self, video_name: &str, n: usize) -> Result<()> {
        let cues = episode_cues(n);
        let borrowed: Vec<(f64, f64, &str)> = cues.iter().map(|(s, e, t)| (*s, *e, t.as_str())).collect();
        self.add_episode(video_name, Some(&borrowed))
    }

    /// Add a subtitle file with raw content
    pub fn add_raw_subtitle(&self, stem: &str, content: &str) -> Result<()> {
        create_test_file(&self.config.paths.subtitles_dir, &format!("{}.srt", stem), content)?;
        Ok(())
    }

    pub fn output(&self, name: &str) -> PathBuf {
        self.config.paths.output_dir.join(name)
    }

    pub fn controller(
        &self,
        summarizer: Arc<dyn Summarizer>,
        diarization: DiarizationCapability,
        media: Arc<FakeMediaBackend>,
    ) -> Controller {
        Controller::with_capabilities(self.config.clone(), summarizer, diarization, media)
    }
}
