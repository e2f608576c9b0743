//! ABOUTME: Google Gemini client for aura generation
//! ABOUTME: Sends the photo inline with a JSON-only prompt and normalises the answer

use async_trait::async_trait;
use au_config::AiSettings;
use au_core::{Error, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::{parse_model_json, AuraAnalysis, AuraGenerator, AuraRequest};

const PROMPT: &str = "You read the aura of photos for a social app. Look at the image and \
answer with a single JSON object and nothing else, using exactly these keys: \
\"caption\" (one evocative sentence, at most 140 characters), \
\"mood\" (one lowercase word), \
\"color\" (the aura color as a #RRGGBB hex string), \
\"score\" (integer 0-100 for how strong the aura is), \
\"tags\" (up to 5 short lowercase keywords).";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Failure of one attempt, split by whether another attempt can help
enum AttemptError {
    Transient(Error),
    Fatal(Error),
}

/// Gemini `generateContent` client
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GeminiClient {
    pub fn new(settings: &AiSettings) -> Result<Self> {
        let api_key = settings
            .gemini_api_key
            .clone()
            .ok_or_else(|| Error::Config("Gemini API key not configured".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_attempts: settings.max_attempts.max(1),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_body(&self, request: &AuraRequest) -> serde_json::Value {
        let prompt = match request.hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => {
                format!("{}\nThe uploader describes the photo as: \"{}\"", PROMPT, hint)
            }
            _ => PROMPT.to_string(),
        };

        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    {
                        "inlineData": {
                            "mimeType": request.content_type,
                            "data": STANDARD.encode(&request.image_data),
                        }
                    }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": 0.8
            }
        })
    }

    async fn attempt(&self, body: &serde_json::Value) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(Error::External(format!("Gemini request failed: {}", e))))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Gemini API error: {} - {}", status, text);
            let err = Error::External(format!("Gemini API error: {}", status));
            return if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                Err(AttemptError::Transient(err))
            } else {
                Err(AttemptError::Fatal(err))
            };
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            AttemptError::Fatal(Error::External(format!("Invalid Gemini response: {}", e)))
        })?;

        if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AttemptError::Fatal(Error::External(format!(
                "Gemini blocked the image: {}",
                reason
            ))));
        }

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                AttemptError::Fatal(Error::External("Gemini returned no candidates".to_string()))
            })
    }
}

#[async_trait]
impl AuraGenerator for GeminiClient {
    async fn generate(&self, request: AuraRequest) -> Result<AuraAnalysis> {
        debug!(
            bytes = request.image_data.len(),
            content_type = %request.content_type,
            "Requesting aura from Gemini"
        );

        let body = self.build_body(&request);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                debug!("Retrying Gemini request in {:?} (attempt {})", self.retry_delay, attempt);
                sleep(self.retry_delay).await;
            }

            match self.attempt(&body).await {
                Ok(text) => {
                    let raw = parse_model_json(&text)?;
                    return AuraAnalysis::normalize(raw, &self.model);
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => {
                    warn!("Gemini attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::External("All Gemini attempts failed".to_string())))
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::External(format!("Gemini health check failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::External(format!(
                "Gemini health check returned {}",
                response.status()
            )))
        }
    }

    fn model(&self) -> &str {
        &self.model
    }
}
