//! ABOUTME: Cloudinary image store using signed upload and destroy calls
//! ABOUTME: Thumbnails are delivery URLs with a crop transformation

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use au_config::CloudinaryConfig;
use bytes::Bytes;
use reqwest::{multipart, Client};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    checksum, extension_for, validate_key, ImageStore, Result, StorageError, StoredObject,
    THUMBNAIL_SIZE,
};

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    bytes: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

pub struct CloudinaryStore {
    client: Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

impl CloudinaryStore {
    pub fn new(config: &CloudinaryConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            api_base: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        }
    }

    /// SHA-256 request signature over the sorted signed parameters
    ///
    /// `params` must already be in alphabetical order.
    pub fn sign(&self, params: &[(&str, &str)]) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Insert a fill crop after `/upload/` in a delivery URL
    pub fn thumbnail_url(secure_url: &str) -> Option<String> {
        secure_url.contains("/upload/").then(|| {
            secure_url.replacen(
                "/upload/",
                &format!(
                    "/upload/c_fill,g_auto,w_{},h_{}/",
                    THUMBNAIL_SIZE, THUMBNAIL_SIZE
                ),
                1,
            )
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/v1_1/{}/image/{}",
            self.api_base, self.cloud_name, action
        )
    }

    async fn error_detail(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        format!("{}: {}", status, message)
    }
}

fn unix_timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ImageStore for CloudinaryStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject> {
        validate_key(key)?;

        let size = data.len();
        let checksum = checksum(&data);
        let timestamp = unix_timestamp();
        let signature = self.sign(&[
            ("folder", self.folder.as_str()),
            ("public_id", key),
            ("timestamp", timestamp.as_str()),
        ]);

        let file_name = format!(
            "{}.{}",
            key.rsplit('/').next().unwrap_or(key),
            extension_for(content_type)
        );
        let file = multipart::Part::bytes(data.to_vec())
            .file_name(file_name)
            .mime_str(content_type)?;

        let form = multipart::Form::new()
            .part("file", file)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("public_id", key.to_string())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        debug!("Uploading {} bytes to Cloudinary as {}", size, key);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = Self::error_detail(response).await;
            warn!("Cloudinary upload failed: {}", detail);
            return Err(StorageError::Provider(format!("Cloudinary upload failed: {}", detail)));
        }

        let uploaded: UploadResponse = response.json().await?;
        info!("Uploaded {} to Cloudinary", uploaded.public_id);

        Ok(StoredObject {
            thumbnail_url: Self::thumbnail_url(&uploaded.secure_url),
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            provider: self.provider().to_string(),
            size: uploaded.bytes.map(|b| b as usize).unwrap_or(size),
            checksum,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let timestamp = unix_timestamp();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", public_id),
                ("timestamp", timestamp.as_str()),
                ("api_key", self.api_key.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = Self::error_detail(response).await;
            return Err(StorageError::Provider(format!("Cloudinary destroy failed: {}", detail)));
        }

        let destroyed: DestroyResponse = response.json().await?;
        match destroyed.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(StorageError::Provider(format!(
                "Cloudinary destroy returned {}",
                other
            ))),
        }
    }

    fn provider(&self) -> &str {
        "cloudinary"
    }
}
