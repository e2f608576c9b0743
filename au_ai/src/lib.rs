//! ABOUTME: Aura generation client abstraction with Gemini and stub implementations
//! ABOUTME: Turns an uploaded photo into caption, mood, color and score metadata

use async_trait::async_trait;
use au_config::{AiProviderKind, AiSettings};
use au_core::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub mod fetch;
pub mod gemini;
pub mod stub;

pub use fetch::{fetch_image, DEFAULT_FETCH_ATTEMPTS};
pub use gemini::GeminiClient;
pub use stub::StubClient;

/// Fallback when the model returns something that is not a hex color
pub const DEFAULT_COLOR: &str = "#8A2BE2";
pub const MAX_TAGS: usize = 5;
const MAX_CAPTION_CHARS: usize = 280;

/// Image to analyse
#[derive(Debug, Clone)]
pub struct AuraRequest {
    pub image_data: Bytes,
    pub content_type: String,
    /// Optional user text steering the caption
    pub hint: Option<String>,
}

/// Normalised aura produced by a generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuraAnalysis {
    pub caption: String,
    pub mood: String,
    /// `#RRGGBB`
    pub color: String,
    /// 0..=100
    pub score: i64,
    pub tags: Vec<String>,
    pub model: String,
}

/// Loosely-typed model output before normalisation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAura {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub mood: String,
    #[serde(default, alias = "colour")]
    pub color: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl AuraAnalysis {
    /// Apply the output rules: non-empty caption, clamped score, hex color, at most five tags
    pub fn normalize(raw: RawAura, model: &str) -> Result<Self> {
        let caption: String = raw.caption.trim().chars().take(MAX_CAPTION_CHARS).collect();
        if caption.is_empty() {
            return Err(Error::External("AI response has no caption".to_string()));
        }

        let mood = raw.mood.trim().to_lowercase();
        let score = if raw.score.is_finite() {
            raw.score.round().clamp(0.0, 100.0) as i64
        } else {
            0
        };

        let mut tags: Vec<String> = Vec::new();
        for tag in raw.tags {
            let tag = tag.trim().trim_start_matches('#').to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
            if tags.len() == MAX_TAGS {
                break;
            }
        }

        Ok(Self {
            caption,
            mood: if mood.is_empty() { "neutral".to_string() } else { mood },
            color: normalize_color(&raw.color),
            score,
            tags,
            model: model.to_string(),
        })
    }
}

/// Uppercase `#RRGGBB`; expands `#RGB`; anything else becomes [`DEFAULT_COLOR`]
pub fn normalize_color(input: &str) -> String {
    let hex = input.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return DEFAULT_COLOR.to_string();
    }
    match hex.len() {
        6 => format!("#{}", hex.to_ascii_uppercase()),
        3 => {
            let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
            format!("#{}", expanded.to_ascii_uppercase())
        }
        _ => DEFAULT_COLOR.to_string(),
    }
}

/// Parse model text as JSON, tolerating a surrounding markdown code fence
pub fn parse_model_json(text: &str) -> Result<RawAura> {
    let trimmed = text.trim();
    let body = if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        rest.trim_end().trim_end_matches("```").trim()
    } else {
        trimmed
    };

    serde_json::from_str(body)
        .map_err(|e| Error::External(format!("AI response is not valid aura JSON: {}", e)))
}

/// Trait for aura generator implementations
#[async_trait]
pub trait AuraGenerator: Send + Sync {
    async fn generate(&self, request: AuraRequest) -> Result<AuraAnalysis>;

    async fn health_check(&self) -> Result<()>;

    fn model(&self) -> &str;
}

/// Create a generator based on configuration
pub fn create_generator(settings: &AiSettings) -> Result<Arc<dyn AuraGenerator>> {
    match settings.provider {
        AiProviderKind::Gemini => {
            info!("Creating Gemini client with model: {}", settings.model);
            Ok(Arc::new(GeminiClient::new(settings)?))
        }
        AiProviderKind::Stub => {
            debug!("Creating stub aura generator");
            Ok(Arc::new(StubClient::new()))
        }
    }
}
