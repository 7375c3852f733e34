//! S3-based blob store.
//!
//! This module stores artifacts, template copies and the manifest in AWS S3
//! (or a compatible service).

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StateError};

use super::store::BlobStore;

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

/// S3-based blob store.
#[derive(Debug)]
pub struct S3BlobStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
}

impl S3BlobStore {
    /// Creates a new S3 blob store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Ok(Self::with_client(Client::new(&config), bucket, prefix))
    }

    /// Creates a new S3 blob store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| {
                let p = p.trim_matches('/');
                if p.is_empty() {
                    String::new()
                } else {
                    format!("{p}/")
                }
            })
            .unwrap_or_default();

        Self {
            client,
            bucket: bucket.to_string(),
            prefix,
        }
    }

    /// Gets the full S3 key for an object.
    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn bucket_exists(&self) -> Result<bool> {
        let result = self.client.head_bucket().bucket(&self.bucket).send().await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(HalldyllError::State(StateError::storage(format!(
                        "S3 head bucket error: {service_err}"
                    ))))
                }
            }
        }
    }

    async fn create_bucket(&self, region: &str) -> Result<()> {
        info!("Creating bucket s3://{} in {region}", self.bucket);

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        if region != DEFAULT_S3_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region))
                    .build(),
            );
        }

        request.send().await.map_err(|e| {
            HalldyllError::State(StateError::storage(format!("S3 create bucket error: {e}")))
        })?;

        Ok(())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()> {
        let key = self.key(key);
        debug!(
            "Uploading s3://{}/{key} ({content_type}, {} bytes)",
            self.bucket,
            body.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| HalldyllError::State(StateError::storage(format!("S3 put error: {e}"))))?;

        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = self.key(key);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match result {
            Ok(response) => {
                let bytes = response.body.collect().await.map_err(|e| {
                    HalldyllError::State(StateError::storage(format!(
                        "Failed to read S3 object: {e}"
                    )))
                })?;

                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    debug!("No object at s3://{}/{key}", self.bucket);
                    Ok(None)
                } else {
                    Err(HalldyllError::State(StateError::storage(format!(
                        "S3 get error: {service_err}"
                    ))))
                }
            }
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let key = self.key(key);
        info!("Deleting s3://{}/{key}", self.bucket);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                HalldyllError::State(StateError::storage(format!("S3 delete error: {e}")))
            })?;

        Ok(())
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}
