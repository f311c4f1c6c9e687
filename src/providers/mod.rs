/*!
 * Capability clients used by the recap pipeline.
 *
 * The pipeline depends only on the two traits defined here:
 * - `Summarizer`: extractive summarization (ranked representative phrases)
 * - `Diarizer`: speaker-labelled time intervals for an audio file
 *
 * Implementations:
 * - `extractive`: in-process term-frequency summarizer
 * - `ollama`: summarizer backed by a local Ollama server
 * - `diarization`: HTTP diarization service client
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::app_config::{Config, SummarizerProvider};
use crate::errors::ProviderError;

/// Extractive summarization capability
///
/// Given the candidate texts (in corpus order) and a requested count, returns
/// up to `count` phrases drawn verbatim from the texts, in the model's own
/// ranked order.
#[async_trait]
pub trait Summarizer: Send + Sync + Debug {
    async fn select(&self, texts: &[String], count: usize) -> Result<Vec<String>, ProviderError>;

    /// Human-readable identifier for logs
    fn name(&self) -> String;
}

/// One speaker-labelled interval produced by diarization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizedInterval {
    /// Interval start in seconds
    pub start: f64,
    /// Interval end in seconds
    pub end: f64,
    /// Opaque label, only meaningful within one video
    #[serde(alias = "label")]
    pub speaker: String,
}

impl DiarizedInterval {
    pub fn new(start: f64, end: f64, speaker: impl Into<String>) -> Self {
        Self {
            start,
            end,
            speaker: speaker.into(),
        }
    }
}

/// Audio diarization capability
#[async_trait]
pub trait Diarizer: Send + Sync + Debug {
    /// Partition the audio file into speaker-labelled intervals
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizedInterval>, ProviderError>;

    /// Verify the capability can serve requests
    async fn test_connection(&self) -> Result<(), ProviderError>;
}

/// Build the configured summarizer
pub fn summarizer_from_config(config: &Config) -> Arc<dyn Summarizer> {
    match config.summarizer.provider {
        SummarizerProvider::Builtin => Arc::new(extractive::ExtractiveSummarizer::new()),
        SummarizerProvider::Ollama => Arc::new(ollama::OllamaSummarizer::new(
            &config.summarizer.endpoint,
            &config.summarizer_model,
            config.summarizer.timeout_secs,
        )),
    }
}

pub mod diarization;
pub mod extractive;
pub mod ollama;
