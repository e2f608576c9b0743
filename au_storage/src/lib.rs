//! ABOUTME: Image storage abstraction for uploaded photos
//! ABOUTME: Local filesystem via object_store plus Cloudinary and Supabase backends

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use au_config::{StorageProviderKind, StorageSettings};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub mod cloudinary;
pub mod local;
pub mod supabase;

pub use cloudinary::CloudinaryStore;
pub use local::LocalStore;
pub use supabase::SupabaseStore;

/// Edge length of generated thumbnails
pub const THUMBNAIL_SIZE: u32 = 400;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<StorageError> for au_core::Error {
    fn from(err: StorageError) -> Self {
        au_core::Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Where an uploaded image ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// Provider handle used for deletion
    pub public_id: String,
    pub provider: String,
    pub size: usize,
    /// Hex MD5 of the uploaded bytes
    pub checksum: String,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `data` under `key` (no extension; the store derives it from the content type)
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject>;

    /// Remove a previously stored object; missing objects are not an error
    async fn delete(&self, public_id: &str) -> Result<()>;

    fn provider(&self) -> &str;
}

/// Hex MD5 of a payload
pub fn checksum(data: &[u8]) -> String {
    hex::encode(md5::compute(data).0)
}

/// File extension for the image content types we accept
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/heic" => "heic",
        _ => "bin",
    }
}

/// Keys are `/`-separated segments of `[A-Za-z0-9_-]`
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        });

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Build the configured backend
pub fn create_store(
    settings: &StorageSettings,
    public_base_url: &str,
) -> Result<Arc<dyn ImageStore>> {
    match settings.provider {
        StorageProviderKind::Local => {
            info!("Using local image storage at {}", settings.local_dir);
            Ok(Arc::new(LocalStore::new(&settings.local_dir, public_base_url)?))
        }
        StorageProviderKind::Cloudinary => {
            let config = settings.cloudinary.as_ref().ok_or_else(|| {
                StorageError::Config("cloudinary settings missing".to_string())
            })?;
            info!("Using Cloudinary image storage ({})", config.cloud_name);
            Ok(Arc::new(CloudinaryStore::new(config)))
        }
        StorageProviderKind::Supabase => {
            let config = settings.supabase.as_ref().ok_or_else(|| {
                StorageError::Config("supabase settings missing".to_string())
            })?;
            info!("Using Supabase image storage (bucket {})", config.bucket);
            Ok(Arc::new(SupabaseStore::new(config)))
        }
    }
}
