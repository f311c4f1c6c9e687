/*!
 * Client for an HTTP speaker-diarization service.
 *
 * Contract: `POST {endpoint}/diarize` with the WAV file as body returns a JSON
 * array of `{start, end, speaker}` objects (or `{"segments": [...]}`);
 * `GET {endpoint}/health` answers 2xx when the model is loaded.
 */

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::DiarizationConfig;
use crate::errors::ProviderError;
use crate::providers::{DiarizedInterval, Diarizer};

/// Diarization service client
#[derive(Debug)]
pub struct HttpDiarizer {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiarizationResponse {
    Bare(Vec<DiarizedInterval>),
    Wrapped { segments: Vec<DiarizedInterval> },
}

impl HttpDiarizer {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Parse a service reply, dropping degenerate intervals
    pub fn parse_response(body: &str) -> Result<Vec<DiarizedInterval>, ProviderError> {
        let parsed: DiarizationResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;
        let intervals = match parsed {
            DiarizationResponse::Bare(v) => v,
            DiarizationResponse::Wrapped { segments } => segments,
        };
        Ok(intervals
            .into_iter()
            .filter(|i| i.end > i.start && i.start.is_finite() && i.end.is_finite())
            .collect())
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizedInterval>, ProviderError> {
        let audio = tokio::fs::read(audio_path).await.map_err(|e| {
            ProviderError::RequestFailed(format!("Failed to read audio {}: {}", audio_path.display(), e))
        })?;

        let url = format!("{}/diarize", self.base_url);
        debug!("Diarizing {} ({} bytes)", audio_path.display(), audio.len());

        let response = self.client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(audio)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response.text().await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        Self::parse_response(&body)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let url = format!("{}/health", self.base_url);
        let response = self.client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::Unavailable(format!(
                "diarization service answered {}",
                response.status()
            )))
        }
    }
}

/// Diarization availability, decided once at startup and passed down
#[derive(Debug, Clone)]
pub enum DiarizationCapability {
    /// Speaker attribution is not configured
    Off,
    /// Configured but failed to initialize; every sentence becomes "UNKNOWN"
    Unavailable(String),
    /// Ready to diarize
    Ready(Arc<dyn Diarizer>),
}

impl DiarizationCapability {
    /// Probe an already-constructed diarizer
    pub async fn probe(diarizer: Arc<dyn Diarizer>) -> Self {
        match diarizer.test_connection().await {
            Ok(()) => Self::Ready(diarizer),
            Err(e) => Self::Unavailable(e.to_string()),
        }
    }

    /// Build the capability described by the configuration
    pub async fn from_config(config: &DiarizationConfig) -> Self {
        if !config.enabled {
            return Self::Off;
        }
        let diarizer: Arc<dyn Diarizer> = Arc::new(HttpDiarizer::new(&config.endpoint, config.timeout_secs));
        Self::probe(diarizer).await
    }
}
