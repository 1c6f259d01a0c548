//! Object storage access for input bundles and result archives.
//!
//! The [`ObjectStore`] trait is the seam the engine and gateway code
//! against; [`S3Store`] is the production implementation (AWS S3 or any
//! S3-compatible endpoint such as MinIO). A filesystem-backed
//! [`LocalStore`] exists for tests and development.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage configuration error: {0}")]
    Config(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("storage request failed: {0}")]
    Request(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Minimal object-store surface the orchestration core needs: fetch
/// input bundles, upload result archives, and mint download links.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's full contents.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Upload an object, replacing any existing one under `key`.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError>;

    /// Pre-signed GET link valid for `expires_in`.
    async fn presigned_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError>;
}

// ---------------------------------------------------------------------------
// S3 implementation
// ---------------------------------------------------------------------------

/// S3-backed store. One bucket per deployment; keys carry the tenant
/// and job folder structure.
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build from environment.
    ///
    /// Requires `S3_BUCKET`; `S3_ENDPOINT_URL` switches to an
    /// S3-compatible endpoint (MinIO) with path-style addressing.
    /// Credentials and region resolve through the standard AWS chain.
    pub async fn from_env() -> Result<Self, StorageError> {
        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| StorageError::Config("S3_BUCKET is not set".into()))?;

        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Ok(endpoint) = std::env::var("S3_ENDPOINT_URL") {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::new(
            aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
        ))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let service = err.as_service_error();
                if service.is_some_and(|e| e.is_no_such_key()) {
                    StorageError::NotFound(key.to_string())
                } else {
                    StorageError::Request(err.to_string())
                }
            })?;

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?
            .into_bytes();

        debug!(key, size = bytes.len(), "fetched object");
        Ok(bytes.to_vec())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?;

        debug!(key, size, "uploaded object");
        Ok(())
    }

    async fn presigned_get(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| StorageError::Config(err.to_string()))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| StorageError::Request(err.to_string()))?;

        Ok(presigned.uri().to_string())
    }
}

// ---------------------------------------------------------------------------
// Local implementation (tests / development)
// ---------------------------------------------------------------------------

/// Filesystem-backed store rooted at a directory. Keys map to relative
/// paths; presigned links are `file://` URIs.
#[derive(Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(StorageError::Request(err.to_string())),
        }
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| StorageError::Request(err.to_string()))?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|err| StorageError::Request(err.to_string()))
    }

    async fn presigned_get(
        &self,
        key: &str,
        _expires_in: Duration,
    ) -> Result<String, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .put_object("folder01/planilha.xlsx", b"conteudo".to_vec())
            .await
            .unwrap();
        let back = store.get_object("folder01/planilha.xlsx").await.unwrap();
        assert_eq!(back, b"conteudo");
    }

    #[tokio::test]
    async fn local_store_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let err = store.get_object("nada.xlsx").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn local_presigned_link_points_at_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.put_object("a/b.zip", vec![1, 2, 3]).await.unwrap();

        let link = store
            .presigned_get("a/b.zip", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(link.starts_with("file://"));
        assert!(link.ends_with("a/b.zip"));
    }
}
