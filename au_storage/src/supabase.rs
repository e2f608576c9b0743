//! ABOUTME: Supabase Storage image store over the storage REST API
//! ABOUTME: Objects go to a public bucket; thumbnails use the image render endpoint

use std::time::Duration;

use async_trait::async_trait;
use au_config::SupabaseConfig;
use bytes::Bytes;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use tracing::{debug, info, warn};

use crate::{
    checksum, extension_for, validate_key, ImageStore, Result, StorageError, StoredObject,
    THUMBNAIL_SIZE,
};

pub struct SupabaseStore {
    client: Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
            bucket: config.bucket.clone(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    fn object_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    pub fn public_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object_path
        )
    }

    pub fn thumbnail_url(&self, object_path: &str) -> String {
        format!(
            "{}/storage/v1/render/image/public/{}/{}?width={}&height={}&resize=cover",
            self.base_url, self.bucket, object_path, THUMBNAIL_SIZE, THUMBNAIL_SIZE
        )
    }
}

#[async_trait]
impl ImageStore for SupabaseStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject> {
        validate_key(key)?;

        let object_path = format!("{}.{}", key, extension_for(content_type));
        let size = data.len();
        let checksum = checksum(&data);

        debug!("Uploading {} bytes to Supabase as {}", size, object_path);

        let response = self
            .authorized(self.client.post(self.object_url(&object_path)))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Supabase upload failed: {} {}", status, body);
            return Err(StorageError::Provider(format!(
                "Supabase upload failed: {}: {}",
                status, body
            )));
        }

        info!("Uploaded {} to Supabase bucket {}", object_path, self.bucket);

        Ok(StoredObject {
            url: self.public_url(&object_path),
            thumbnail_url: Some(self.thumbnail_url(&object_path)),
            public_id: object_path,
            provider: self.provider().to_string(),
            size,
            checksum,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.object_url(public_id)))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Object {} already gone", public_id);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Provider(format!(
                    "Supabase delete failed: {}: {}",
                    status, body
                )))
            }
        }
    }

    fn provider(&self) -> &str {
        "supabase"
    }
}
