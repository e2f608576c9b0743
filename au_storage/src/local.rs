//! ABOUTME: Local filesystem image store built on object_store
//! ABOUTME: Files live under a media directory served by the API at /media

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use bytes::Bytes;
use object_store::{local::LocalFileSystem, path::Path, ObjectStore, PutPayload};
use tracing::{debug, info, warn};
use url::Url;

use crate::{checksum, extension_for, validate_key, ImageStore, Result, StorageError, StoredObject};

pub struct LocalStore {
    store: LocalFileSystem,
    root: PathBuf,
    media_base: String,
}

impl LocalStore {
    /// `public_base_url` is the externally reachable API origin
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let root = dir.into();
        std::fs::create_dir_all(&root)?;

        let base = Url::parse(public_base_url)
            .map_err(|e| StorageError::Config(format!("Invalid public base URL: {}", e)))?;

        let store = LocalFileSystem::new_with_prefix(&root)?;
        debug!("Initialized local image storage at: {:?}", root);

        Ok(Self {
            store,
            root,
            media_base: format!("{}/media", base.as_str().trim_end_matches('/')),
        })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Read an object back; used by tests and maintenance tooling
    pub async fn get(&self, public_id: &str) -> Result<Bytes> {
        let path = Path::from(public_id);
        let result = self.with_retry(|| async { self.store.get(&path).await }).await?;
        Ok(result.bytes().await?)
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, object_store::Error>>,
    {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        retry(backoff, || async {
            operation().await.map_err(|e| match e {
                object_store::Error::NotFound { .. } => backoff::Error::permanent(e),
                e => {
                    warn!("Storage operation failed, will retry: {}", e);
                    backoff::Error::transient(e)
                }
            })
        })
        .await
        .map_err(StorageError::ObjectStore)
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<StoredObject> {
        validate_key(key)?;

        let object_key = format!("{}.{}", key, extension_for(content_type));
        let path = Path::from(object_key.as_str());
        let size = data.len();
        let checksum = checksum(&data);
        let payload = PutPayload::from(data);

        self.with_retry(|| async { self.store.put(&path, payload.clone()).await })
            .await?;

        info!("Stored {} bytes at {}", size, object_key);

        Ok(StoredObject {
            url: format!("{}/{}", self.media_base, object_key),
            thumbnail_url: None,
            public_id: object_key,
            provider: self.provider().to_string(),
            size,
            checksum,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        let path = Path::from(public_id);
        match self.with_retry(|| async { self.store.delete(&path).await }).await {
            Ok(()) => Ok(()),
            Err(StorageError::ObjectStore(object_store::Error::NotFound { .. })) => {
                debug!("Object {} already gone", public_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn provider(&self) -> &str {
        "local"
    }
}
