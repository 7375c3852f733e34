//! Blob store trait definition.
//!
//! This module defines the common interface for the bucket that holds
//! artifacts, template copies and the manifest.

use async_trait::async_trait;

use crate::error::Result;

/// Content type of JSON documents.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of packaged archives.
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Trait for blob storage backends bound to a single bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Checks whether the bucket exists.
    async fn bucket_exists(&self) -> Result<bool>;

    /// Creates the bucket in the given region.
    async fn create_bucket(&self, region: &str) -> Result<()>;

    /// Stores an object.
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Reads an object.
    ///
    /// Returns `None` if the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deletes an object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Name of the bucket.
    fn bucket(&self) -> &str;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
