//! Filesystem blob store.
//!
//! Each bucket is a directory under a base path and each key a file below
//! it. Used for local runs against a development control plane and in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StateError};

use super::store::BlobStore;

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    /// Bucket name.
    bucket: String,
    /// Directory standing in for the bucket.
    bucket_dir: PathBuf,
}

impl FsBlobStore {
    /// Creates a store for `bucket` under `base_dir`.
    #[must_use]
    pub fn new(base_dir: impl AsRef<Path>, bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            bucket_dir: base_dir.as_ref().join(bucket),
        }
    }

    /// Directory standing in for the bucket.
    #[must_use]
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    /// Maps a key to a path, refusing keys that escape the bucket.
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let key = key.trim_start_matches('/');
        if key.is_empty() || key.split('/').any(|part| part == "..") {
            return Err(HalldyllError::State(StateError::storage(format!(
                "Invalid object key: {key}"
            ))));
        }
        Ok(self.bucket_dir.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket_dir.is_dir())
    }

    async fn create_bucket(&self, region: &str) -> Result<()> {
        info!(
            "Creating bucket {} ({region}) at {}",
            self.bucket,
            self.bucket_dir.display()
        );
        fs::create_dir_all(&self.bucket_dir).await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to create bucket directory: {e}"
            )))
        })
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let path = self.object_path(key)?;
        debug!("Writing {key} ({content_type}, {} bytes)", body.len());

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                HalldyllError::State(StateError::storage(format!(
                    "Failed to create object directory: {e}"
                )))
            })?;
        }

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to create temp object file: {e}"
            )))
        })?;

        file.write_all(&body).await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to write object file: {e}"
            )))
        })?;

        file.sync_all().await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to sync object file: {e}"
            )))
        })?;

        fs::rename(&temp_path, &path).await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to rename object file: {e}"
            )))
        })?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            debug!("Object does not exist: {key}");
            return Ok(None);
        }

        let bytes = fs::read(&path).await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!(
                "Failed to read object {key}: {e}"
            )))
        })?;

        Ok(Some(bytes))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        if path.is_file() {
            debug!("Deleting object {key}");
            fs::remove_file(&path).await.map_err(|e| {
                HalldyllError::State(StateError::storage(format!(
                    "Failed to delete object {key}: {e}"
                )))
            })?;
        }
        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_type(&self) -> &'static str {
        "filesystem"
    }
}
