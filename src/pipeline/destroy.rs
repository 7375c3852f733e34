//! Tearing down a deployed application.

use tracing::info;

use crate::error::Result;
use crate::state::DeploymentRepository;

use super::apply::StackApplier;

/// Deletes the stack and marks the manifest as having no active version.
///
/// The bucket, the versioned copies and the recorded hashes are kept, so a
/// later deploy continues after the highest recorded label.
#[derive(Debug, Clone)]
pub struct Destroy {
    applier: StackApplier,
    repository: DeploymentRepository,
}

impl Destroy {
    /// Creates a destroy over the given applier and repository.
    #[must_use]
    pub const fn new(applier: StackApplier, repository: DeploymentRepository) -> Self {
        Self {
            applier,
            repository,
        }
    }

    /// Deletes `stack`, waits until it is gone, then deactivates the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest belongs to another application or the
    /// deletion fails.
    pub async fn run(&self, stack: &str) -> Result<()> {
        let manifest = self.repository.load_owned_manifest(stack).await?;

        self.applier.delete(stack).await?;
        if let Some(mut manifest) = manifest {
            manifest.deactivate();
            self.repository.save_manifest(&manifest).await?;
        }

        info!("Stack {stack} destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeControlPlane;
    use crate::remote::{ControlPlane, ManualClock, PollPolicy, StackWaiter};
    use crate::state::{FsBlobStore, Manifest, Operation, VersionLabel};
    use std::sync::Arc;

    fn destroy(control: &Arc<FakeControlPlane>, repository: DeploymentRepository) -> Destroy {
        let waiter = StackWaiter::with_clock(
            control.clone(),
            Arc::new(ManualClock::new()),
            PollPolicy::default(),
        );
        Destroy::new(StackApplier::new(control.clone(), waiter), repository)
    }

    #[tokio::test]
    async fn test_destroy_removes_stack_and_deactivates_manifest() {
        let bucket = tempfile::tempdir().expect("bucket");
        let repository =
            DeploymentRepository::new(Arc::new(FsBlobStore::new(bucket.path(), "deploys")));
        let mut manifest = Manifest::new("shop");
        manifest.record_version(VersionLabel::FIRST, "aaa").expect("record");
        manifest
            .activate(VersionLabel::FIRST, Operation::Deploy)
            .expect("activate");
        repository.save_manifest(&manifest).await.expect("save");

        let control = Arc::new(FakeControlPlane::new());
        control.create_stack("shop", "{}").await.expect("create");

        destroy(&control, repository.clone())
            .run("shop")
            .await
            .expect("destroy");

        assert!(control.describe_stack("shop").await.expect("describe").is_none());
        let kept = repository
            .load_manifest()
            .await
            .expect("load")
            .expect("manifest kept");
        assert_eq!(kept.active_version, None);
        assert_eq!(kept.hash_for(VersionLabel::FIRST), Some("aaa"));
    }

    #[tokio::test]
    async fn test_destroy_refuses_foreign_manifest() {
        let bucket = tempfile::tempdir().expect("bucket");
        let repository =
            DeploymentRepository::new(Arc::new(FsBlobStore::new(bucket.path(), "deploys")));
        repository
            .save_manifest(&Manifest::new("someone-else"))
            .await
            .expect("save");

        let control = Arc::new(FakeControlPlane::new());
        assert!(destroy(&control, repository).run("shop").await.is_err());
        assert!(control.calls().is_empty());
    }
}
