//! ABOUTME: Stub aura generator with deterministic output
//! ABOUTME: No network calls; the same bytes always produce the same aura

use async_trait::async_trait;
use au_core::{Error, Result};
use tracing::debug;

use crate::{AuraAnalysis, AuraGenerator, AuraRequest, RawAura};

const MOODS: &[(&str, &str)] = &[
    ("serene", "A calm glow settles over this moment"),
    ("radiant", "Bright energy spills out of every corner"),
    ("mysterious", "Something unspoken hangs in the air"),
    ("playful", "A mischievous spark lights up the scene"),
    ("nostalgic", "It feels like a memory you almost remember"),
    ("bold", "Loud, confident and impossible to ignore"),
];

const TAGS: &[&str] = &[
    "golden", "dreamy", "vivid", "moody", "soft", "electric", "warm", "cool",
];

pub struct StubClient;

impl StubClient {
    pub fn new() -> Self {
        Self
    }

    /// FNV-1a over the image bytes and hint
    fn fingerprint(request: &AuraRequest) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        let hint = request.hint.as_deref().unwrap_or_default().as_bytes();
        for byte in request.image_data.iter().chain(hint.iter()) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }
}

impl Default for StubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuraGenerator for StubClient {
    async fn generate(&self, request: AuraRequest) -> Result<AuraAnalysis> {
        if request.image_data.is_empty() {
            return Err(Error::Validation("Image is empty".to_string()));
        }

        let hash = Self::fingerprint(&request);
        debug!(fingerprint = hash, "Stub generator producing aura");

        let (mood, line) = MOODS[(hash % MOODS.len() as u64) as usize];
        let caption = match request.hint.as_deref().map(str::trim) {
            Some(hint) if !hint.is_empty() => format!("{}: {}", line, hint),
            _ => line.to_string(),
        };

        let first = (hash >> 8) as usize % TAGS.len();
        let second = (first + 1 + (hash >> 16) as usize % (TAGS.len() - 1)) % TAGS.len();

        let raw = RawAura {
            caption,
            mood: mood.to_string(),
            color: format!(
                "{:02X}{:02X}{:02X}",
                (hash >> 24) as u8,
                (hash >> 32) as u8,
                (hash >> 40) as u8
            ),
            score: (40 + (hash >> 48) % 61) as f64,
            tags: vec![mood.to_string(), TAGS[first].to_string(), TAGS[second].to_string()],
        };

        AuraAnalysis::normalize(raw, self.model())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn model(&self) -> &str {
        "stub"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(data: Vec<u8>, hint: Option<&str>) -> AuraRequest {
        AuraRequest {
            image_data: Bytes::from(data),
            content_type: "image/png".to_string(),
            hint: hint.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_stub_is_deterministic() {
        let client = StubClient::new();
        let a = client
            .generate(request(test_support::tiny_png(), None))
            .await
            .unwrap();
        let b = client
            .generate(request(test_support::tiny_png(), None))
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.model, "stub");
    }

    #[tokio::test]
    async fn test_stub_output_is_within_rules() {
        let client = StubClient::new();
        for len in [16usize, 64, 257, 1024] {
            let aura = client
                .generate(request(test_support::fake_jpeg(len), Some("city lights")))
                .await
                .unwrap();
            assert!((40..=100).contains(&aura.score));
            assert_eq!(aura.color.len(), 7);
            assert!(aura.color.starts_with('#'));
            assert!(aura.tags.len() <= crate::MAX_TAGS);
            assert!(aura.caption.ends_with("city lights"));
        }
    }

    #[tokio::test]
    async fn test_stub_rejects_empty_image() {
        let client = StubClient::new();
        assert!(client.generate(request(Vec::new(), None)).await.is_err());
    }
}
