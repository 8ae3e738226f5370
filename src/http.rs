//! HTTP advice client for the Gemini generative language API.
//!
//! This module provides:
//! - Connection reuse through a single `reqwest::Client`
//! - Automatic retry with exponential backoff on 429 and transport errors
//! - Mapping of every failure onto `ConfigurationError` / `ServiceFailure`

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::advice::{build_prompt, AdviceService};
use crate::{MileageError, Result, TrackingData};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Connection settings for the advice service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl GeminiConfig {
    /// Defaults plus the key from `GEMINI_API_KEY` (or `API_KEY`).
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("[GeminiAdvice] No API key in GEMINI_API_KEY or API_KEY");
        }
        Self {
            api_key,
            ..Self::default()
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

// Request / response bodies

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

/// Concatenated text of the first candidate, if it has any.
fn extract_text(response: GenerateResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn backoff(attempt: u32) -> Duration {
    // 1s, 2s, 4s, 8s...
    Duration::from_millis(1000 * (1 << attempt.min(4)))
}

/// Advice service backed by Gemini.
pub struct GeminiAdviceService {
    client: Client,
    config: GeminiConfig,
}

impl GeminiAdviceService {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MileageError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn generate(&self, api_key: &str, prompt: String) -> Result<String> {
        let url = self.config.url();
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: Some(prompt) }],
            }],
        };

        let mut retries = 0;

        loop {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(MileageError::ServiceFailure {
                                message: "Max retries exceeded (429)".to_string(),
                                status_code: Some(status.as_u16()),
                            });
                        }
                        let wait = backoff(retries);
                        warn!("[GeminiAdvice] 429, retry {} after {:?}", retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(MileageError::ServiceFailure {
                            message: format!("HTTP {}", status),
                            status_code: Some(status.as_u16()),
                        });
                    }

                    let parsed = resp.json::<GenerateResponse>().await.map_err(|e| {
                        MileageError::ServiceFailure {
                            message: format!("Parse error: {}", e),
                            status_code: Some(status.as_u16()),
                        }
                    })?;

                    return extract_text(parsed).ok_or_else(|| MileageError::ServiceFailure {
                        message: "Response contained no text".to_string(),
                        status_code: Some(status.as_u16()),
                    });
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(MileageError::ServiceFailure {
                            message: format!("Request error: {}", e),
                            status_code: None,
                        });
                    }
                    let wait = Duration::from_millis(500 * (1 << retries.min(4)));
                    warn!(
                        "[GeminiAdvice] Request error: {}, retry {} after {:?}",
                        e, retries, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl AdviceService for GeminiAdviceService {
    async fn get_mileage_tips(&self, data: &TrackingData) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MileageError::configuration("Gemini API key is not configured"))?;

        let prompt = build_prompt(data);
        debug!("[GeminiAdvice] Prompt:\n{}", prompt);

        let start = Instant::now();
        let text = self.generate(api_key, prompt).await?;
        info!(
            "[GeminiAdvice] {} chars of advice in {:.2}s",
            text.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(text)
    }
}
