//! ABOUTME: Image upload pipeline: read multipart, generate aura, store, persist
//! ABOUTME: AI analysis runs before storage so rejected images are never stored

use crate::AppState;
use actix_multipart::Multipart;
use au_ai::{fetch_image, AuraAnalysis, AuraRequest, DEFAULT_FETCH_ATTEMPTS};
use au_config::UploadConfig;
use au_core::{Error, Id, Result};
use au_db::{Aura, ImageWithAura, NewAura, NewImage};
use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use tracing::{debug, info, instrument, warn};

/// Longest accepted prompt hint, in characters
pub const MAX_HINT_CHARS: usize = 200;

/// A validated image taken from the request body
#[derive(Debug)]
pub struct UploadedImage {
    pub data: Bytes,
    pub content_type: String,
    pub filename: Option<String>,
    pub hint: Option<String>,
}

/// Read the `file` and optional `hint` parts, enforcing size and type limits
pub async fn read_multipart(mut payload: Multipart, limits: &UploadConfig) -> Result<UploadedImage> {
    let mut file: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut hint: Option<String> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| Error::Validation(format!("Malformed multipart body: {}", e)))?
    {
        let disposition = field.content_disposition().clone();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let declared_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let limit = match name.as_str() {
            "file" => limits.max_bytes,
            "hint" => MAX_HINT_CHARS * 4,
            _ => 0,
        };

        let mut buffer = BytesMut::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| Error::Validation(format!("Failed to read upload: {}", e)))?
        {
            if name.is_empty() || limit == 0 {
                continue;
            }
            if buffer.len() + chunk.len() > limit {
                return Err(Error::Validation(match name.as_str() {
                    "file" => format!("Image exceeds the {} byte limit", limits.max_bytes),
                    _ => format!("Hint exceeds {} characters", MAX_HINT_CHARS),
                }));
            }
            buffer.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                let filename = disposition.get_filename().map(str::to_string);
                file = Some((buffer.freeze(), declared_type, filename));
            }
            "hint" => {
                let text = String::from_utf8(buffer.to_vec())
                    .map_err(|_| Error::Validation("Hint must be UTF-8 text".to_string()))?;
                let text = text.trim().to_string();
                if text.chars().count() > MAX_HINT_CHARS {
                    return Err(Error::Validation(format!(
                        "Hint exceeds {} characters",
                        MAX_HINT_CHARS
                    )));
                }
                hint = Some(text).filter(|t| !t.is_empty());
            }
            other => debug!("Ignoring multipart field: {}", other),
        }
    }

    let (data, declared_type, filename) =
        file.ok_or_else(|| Error::Validation("Missing multipart field 'file'".to_string()))?;

    if data.is_empty() {
        return Err(Error::Validation("Uploaded file is empty".to_string()));
    }

    let content_type = resolve_content_type(declared_type.as_deref(), filename.as_deref());
    if !limits.allowed_content_types.iter().any(|t| t == &content_type) {
        return Err(Error::Validation(format!(
            "Unsupported content type '{}'; allowed: {}",
            content_type,
            limits.allowed_content_types.join(", ")
        )));
    }

    Ok(UploadedImage {
        data,
        content_type,
        filename,
        hint,
    })
}

/// Part header wins unless it is missing or generic; otherwise guess from the filename
pub fn resolve_content_type(declared: Option<&str>, filename: Option<&str>) -> String {
    match declared {
        Some(declared) if declared != "application/octet-stream" => declared.to_string(),
        _ => filename
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string()),
    }
}

fn new_aura(analysis: AuraAnalysis) -> NewAura {
    NewAura {
        caption: analysis.caption,
        mood: analysis.mood,
        color: analysis.color,
        score: analysis.score,
        tags: analysis.tags,
        model: analysis.model,
    }
}

pub struct UploadPipeline<'a> {
    state: &'a AppState,
}

impl<'a> UploadPipeline<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    async fn analyze(&self, request: AuraRequest) -> Result<AuraAnalysis> {
        self.state.generator.generate(request).await.map_err(|e| {
            self.state.metrics.inc_aura_failures();
            warn!(model = self.state.generator.model(), "Aura generation failed: {}", e);
            e
        })
    }

    /// Analyze, store, then persist image and aura together
    #[instrument(skip(self, upload), fields(size = upload.data.len(), content_type = %upload.content_type))]
    pub async fn process(&self, user_id: &str, upload: UploadedImage) -> Result<ImageWithAura> {
        let analysis = self
            .analyze(AuraRequest {
                image_data: upload.data.clone(),
                content_type: upload.content_type.clone(),
                hint: upload.hint.clone(),
            })
            .await?;

        let key = format!("{}/{}", user_id, Id::new());
        let size_bytes = upload.data.len() as i64;
        let stored = self
            .state
            .store
            .put(&key, upload.data, &upload.content_type)
            .await?;

        let image = NewImage {
            user_id: user_id.to_string(),
            url: stored.url,
            thumbnail_url: stored.thumbnail_url,
            public_id: stored.public_id.clone(),
            provider: stored.provider,
            content_type: upload.content_type,
            size_bytes,
            original_filename: upload.filename,
        };

        match self.state.db.images().create_with_aura(image, new_aura(analysis)).await {
            Ok(created) => {
                self.state.metrics.inc_images_uploaded();
                info!(image_id = %created.image.id, "Image uploaded");
                Ok(created)
            }
            Err(e) => {
                warn!("Failed to persist image, removing stored object: {}", e);
                if let Err(cleanup) = self.state.store.delete(&stored.public_id).await {
                    warn!("Failed to remove orphaned object {}: {}", stored.public_id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Re-run generation on an already stored image owned by `user_id`
    #[instrument(skip(self))]
    pub async fn regenerate(&self, image_id: &str, user_id: &str) -> Result<Aura> {
        let image = self
            .state
            .db
            .images()
            .find_by_id(image_id)
            .await?
            .ok_or_else(|| Error::NotFound("Image not found".to_string()))?;

        if image.user_id != user_id {
            return Err(Error::Forbidden(
                "Only the owner can regenerate an aura".to_string(),
            ));
        }

        let (data, fetched_type) = fetch_image(
            &self.state.http,
            &image.url,
            DEFAULT_FETCH_ATTEMPTS,
            self.state.fetch_retry_delay,
        )
        .await?;

        let analysis = self
            .analyze(AuraRequest {
                image_data: data,
                content_type: fetched_type.unwrap_or(image.content_type),
                hint: None,
            })
            .await?;

        let aura = self
            .state
            .db
            .auras()
            .upsert_for_image(&image.id, new_aura(analysis))
            .await?;

        info!(image_id = %image.id, score = aura.score, "Aura regenerated");
        Ok(aura)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_content_type() {
        assert_eq!(resolve_content_type(Some("image/png"), Some("a.jpg")), "image/png");
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), Some("a.jpg")),
            "image/jpeg"
        );
        assert_eq!(resolve_content_type(None, Some("photo.webp")), "image/webp");
        assert_eq!(resolve_content_type(None, None), "application/octet-stream");
    }
}
