//! Typed access to the deployment bucket.
//!
//! Layout inside the bucket:
//!
//! ```text
//! halldyll/manifest.json
//! halldyll/versions/<version>/template.json
//! halldyll/versions/<version>/config.json
//! halldyll/versions/<version>/functions/<function>-<hash>.zip
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StateError};

use super::store::{BlobStore, JSON_CONTENT_TYPE};
use super::types::{Manifest, VersionLabel};

/// Root prefix of every key written by the orchestrator.
const KEY_ROOT: &str = "halldyll";

/// Characters of the content hash kept in artifact keys.
const ARTIFACT_HASH_LEN: usize = 12;

/// Key of the manifest.
#[must_use]
pub fn manifest_key() -> String {
    format!("{KEY_ROOT}/manifest.json")
}

/// Key of the stored template for a version.
#[must_use]
pub fn template_key(version: VersionLabel) -> String {
    format!("{KEY_ROOT}/versions/{version}/template.json")
}

/// Key of the stored configuration for a version.
#[must_use]
pub fn config_key(version: VersionLabel) -> String {
    format!("{KEY_ROOT}/versions/{version}/config.json")
}

/// Upload key of a function archive.
///
/// The key carries the version and the function's content hash, so one
/// function has at most one artifact per version.
#[must_use]
pub fn artifact_key(version: VersionLabel, function: &str, content_hash: &str) -> String {
    let hash = content_hash.get(..ARTIFACT_HASH_LEN).unwrap_or(content_hash);
    format!(
        "{KEY_ROOT}/versions/{version}/functions/{}-{hash}.zip",
        function.trim_matches('/').replace('/', "-")
    )
}

/// Manifest and versioned copies stored in the deployment bucket.
#[derive(Clone)]
pub struct DeploymentRepository {
    store: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for DeploymentRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentRepository")
            .field("bucket", &self.store.bucket())
            .field("backend", &self.store.backend_type())
            .finish()
    }
}

impl DeploymentRepository {
    /// Wraps a blob store.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// The underlying blob store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Loads the manifest.
    ///
    /// Returns `None` if no manifest exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read or parsed.
    pub async fn load_manifest(&self) -> Result<Option<Manifest>> {
        let key = manifest_key();
        debug!("Loading manifest from {}/{key}", self.store.bucket());

        let Some(bytes) = self.store.get_object(&key).await? else {
            debug!("No manifest found");
            return Ok(None);
        };

        let manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
            HalldyllError::State(StateError::Corrupted {
                message: format!("Failed to parse manifest: {e}"),
            })
        })?;

        Ok(Some(manifest))
    }

    /// Loads the manifest and checks that it belongs to `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::IdentityMismatch`] if the bucket holds another
    /// application's manifest.
    pub async fn load_owned_manifest(&self, identifier: &str) -> Result<Option<Manifest>> {
        let manifest = self.load_manifest().await?;
        if let Some(manifest) = &manifest {
            manifest.verify_identity(identifier)?;
        }
        Ok(manifest)
    }

    /// Saves the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized or written.
    pub async fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let content = serde_json::to_vec_pretty(manifest).map_err(|e| {
            HalldyllError::State(StateError::serialization(format!(
                "Failed to serialize manifest: {e}"
            )))
        })?;

        info!(
            "Saving manifest (active version: {})",
            manifest
                .active_version
                .map_or_else(|| String::from("none"), |v| v.to_string())
        );
        self.store
            .put_object(&manifest_key(), content, JSON_CONTENT_TYPE)
            .await
    }

    /// Stores the template applied for a version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save_template(&self, version: VersionLabel, body: &str) -> Result<()> {
        self.store
            .put_object(
                &template_key(version),
                body.as_bytes().to_vec(),
                JSON_CONTENT_TYPE,
            )
            .await
    }

    /// Loads the template stored for a version.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] if no template was stored.
    pub async fn load_template(&self, version: VersionLabel) -> Result<String> {
        let key = template_key(version);
        let bytes = self
            .store
            .get_object(&key)
            .await?
            .ok_or_else(|| StateError::NotFound { key: key.clone() })?;

        String::from_utf8(bytes).map_err(|e| {
            HalldyllError::State(StateError::Corrupted {
                message: format!("Template {key} is not UTF-8: {e}"),
            })
        })
    }

    /// Stores the resolved configuration deployed as a version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn save_config(&self, version: VersionLabel, body: &str) -> Result<()> {
        self.store
            .put_object(
                &config_key(version),
                body.as_bytes().to_vec(),
                JSON_CONTENT_TYPE,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FsBlobStore, Operation};
    use tempfile::TempDir;

    fn repository(temp: &TempDir) -> DeploymentRepository {
        DeploymentRepository::new(Arc::new(FsBlobStore::new(temp.path(), "deploys")))
    }

    #[test]
    fn test_keys() {
        let v3 = VersionLabel::new(3);
        assert_eq!(manifest_key(), "halldyll/manifest.json");
        assert_eq!(template_key(v3), "halldyll/versions/v3/template.json");
        assert_eq!(config_key(v3), "halldyll/versions/v3/config.json");
        assert_eq!(
            artifact_key(v3, "users/list", "0123456789abcdef"),
            "halldyll/versions/v3/functions/users-list-0123456789ab.zip"
        );
    }

    #[tokio::test]
    async fn test_manifest_round_trip() {
        let temp = TempDir::new().expect("temp dir");
        let repo = repository(&temp);

        assert!(repo.load_manifest().await.expect("load").is_none());

        let mut manifest = Manifest::new("shop");
        manifest
            .record_version(VersionLabel::FIRST, "abc")
            .expect("record");
        manifest
            .activate(VersionLabel::FIRST, Operation::Deploy)
            .expect("activate");
        repo.save_manifest(&manifest).await.expect("save");

        let loaded = repo.load_manifest().await.expect("load").expect("present");
        assert_eq!(loaded.active_version, Some(VersionLabel::FIRST));

        assert!(repo.load_owned_manifest("shop").await.is_ok());
        assert!(repo.load_owned_manifest("blog").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_template_is_not_found() {
        let temp = TempDir::new().expect("temp dir");
        let repo = repository(&temp);

        let err = repo.load_template(VersionLabel::new(7)).await.unwrap_err();
        assert!(matches!(err, HalldyllError::State(StateError::NotFound { .. })));

        repo.save_template(VersionLabel::new(7), "{\"Resources\":{}}")
            .await
            .expect("save");
        assert_eq!(
            repo.load_template(VersionLabel::new(7)).await.expect("load"),
            "{\"Resources\":{}}"
        );
    }
}
