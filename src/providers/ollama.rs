use async_trait::async_trait;
use log::{debug, error};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ProviderError;
use crate::providers::Summarizer;

/// Leading list markers a model tends to add: "1.", "2)", "-", "*", "•"
static LIST_MARKER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]\s+|[-*\u{2022}]\s+)").unwrap()
});

/// Summarizer that asks a local Ollama model to pick sentences verbatim
#[derive(Debug)]
pub struct OllamaSummarizer {
    /// Base URL of the Ollama API
    base_url: String,
    /// Model name
    model: String,
    /// HTTP client for making requests
    client: Client,
    /// Maximum number of retry attempts
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// System message to guide the model
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Random seed for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
}

impl GenerationRequest {
    /// Create a new non-streaming, deterministic generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system: None,
            options: Some(GenerationOptions {
                temperature: Some(0.0),
                seed: Some(42),
            }),
            stream: Some(false),
        }
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

impl OllamaSummarizer {
    pub fn new(endpoint: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                // Force HTTP/1.1 - Ollama uses HTTP/1.1
                .http1_only()
                .build()
                .unwrap_or_default(),
            max_retries: 2,
            backoff_base_ms: 1000,
        }
    }

    fn build_prompt(texts: &[String], count: usize) -> (String, String) {
        let system = format!(
            "You are an extractive summarizer for TV episode dialogue. \
             Pick the {} most important sentences for a \"previously on\" recap. \
             Copy each sentence exactly as written, one per line, most important first. \
             Do not add numbering, commentary or new text.",
            count
        );
        let prompt = texts.join("\n");
        (system, prompt)
    }

    /// Turn the model's reply into clean phrases
    pub fn parse_phrases(response: &str, count: usize) -> Vec<String> {
        response
            .lines()
            .map(|line| LIST_MARKER_REGEX.replace(line, "").trim().to_string())
            .map(|line| line.trim_matches(|c| c == '"' || c == '\u{201C}' || c == '\u{201D}').trim().to_string())
            .filter(|line| !line.is_empty())
            .take(count)
            .collect()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);

        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= self.max_retries {
            match self.client.post(&url).json(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<GenerationResponse>()
                            .await
                            .map_err(|e| ProviderError::ParseError(e.to_string()));
                    }

                    let error_text = response.text().await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    if status.is_server_error() {
                        // Server error - can retry
                        error!("Ollama API error ({}): {} - attempt {}/{}", status, error_text, attempt + 1, self.max_retries + 1);
                        last_error = Some(ProviderError::ApiError {
                            status_code: status.as_u16(),
                            message: error_text,
                        });
                    } else {
                        // Client error - don't retry
                        return Err(ProviderError::ApiError {
                            status_code: status.as_u16(),
                            message: error_text,
                        });
                    }
                }
                Err(e) => {
                    error!("Ollama API network error: {} - attempt {}/{}", e, attempt + 1, self.max_retries + 1);
                    last_error = Some(ProviderError::ConnectionError(e.to_string()));
                }
            }

            attempt += 1;

            if attempt <= self.max_retries {
                let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::RequestFailed(format!("Ollama request failed after {} attempts", self.max_retries + 1))
        }))
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn select(&self, texts: &[String], count: usize) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() || count == 0 {
            return Ok(Vec::new());
        }

        let (system, prompt) = Self::build_prompt(texts, count);
        let request = GenerationRequest::new(&self.model, prompt).system(system);
        let response = self.generate(&request).await?;
        debug!("Ollama ({}) returned {} chars", response.model, response.response.len());

        Ok(Self::parse_phrases(&response.response, count))
    }

    fn name(&self) -> String {
        format!("Ollama ({})", self.model)
    }
}
