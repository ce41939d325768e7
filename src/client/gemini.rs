//! Gemini `generateContent` client

use super::DecompositionService;
use crate::error::{NormalizeError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Connection settings for the external service
#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API key; `GOOGLE_API_KEY` overrides the file value
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            endpoint: default_endpoint(),
            timeout: default_timeout(),
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, if any
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Gemini-backed decomposition service
pub struct GeminiService {
    client: Client,
    api_key: String,
    url: String,
}

impl GeminiService {
    /// Create a service. Missing credentials are run-fatal.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                NormalizeError::config(format!("{} environment variable not set", API_KEY_ENV))
            })?
            .to_string();

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| NormalizeError::config(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!(
            "{}/models/{}:generateContent",
            config.endpoint.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            api_key,
            url,
        })
    }
}

/// Map a non-success status to the error taxonomy
fn classify_status(status: StatusCode, body: &str) -> NormalizeError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => NormalizeError::Throttled(format!("{}: {}", status, body)),
        _ if body.contains("RESOURCE_EXHAUSTED") => {
            NormalizeError::Throttled(format!("{}: {}", status, body))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            NormalizeError::config(format!("API key rejected ({}): {}", status, body))
        }
        // Gemini reports a bad key as 400 INVALID_ARGUMENT
        _ if body.contains("API_KEY_INVALID") => {
            NormalizeError::config(format!("API key rejected ({}): {}", status, body))
        }
        status => NormalizeError::External(format!("API error {}: {}", status, body)),
    }
}

#[async_trait]
impl DecompositionService for GeminiService {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NormalizeError::External(format!("API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| NormalizeError::External(format!("Failed to parse response: {}", e)))?;
        let text = body.text();
        trace!("Raw response: {:?}", text);
        Ok(text)
    }
}
