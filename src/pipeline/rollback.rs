//! Rolling back to a stored version.

use serde::Serialize;
use tracing::info;

use crate::error::{Result, StateError};
use crate::state::{DeploymentRepository, Manifest, Operation, VersionLabel, manifest_key};

use super::apply::{ApplyOutcome, StackApplier};

/// Result of a rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackOutcome {
    /// Version now active.
    pub version: VersionLabel,
    /// Version active before.
    pub previous_version: Option<VersionLabel>,
    /// Whether the stack had to change.
    pub changed: bool,
}

/// Re-applies the template stored for a version.
#[derive(Debug, Clone)]
pub struct Rollback {
    applier: StackApplier,
    repository: DeploymentRepository,
}

impl Rollback {
    /// Creates a rollback over the given applier and repository.
    #[must_use]
    pub const fn new(applier: StackApplier, repository: DeploymentRepository) -> Self {
        Self {
            applier,
            repository,
        }
    }

    /// Makes `target` the active version of `stack`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NotFound`] without a manifest,
    /// [`StateError::IdentityMismatch`] for a foreign one,
    /// [`StateError::UnknownVersion`] if `target` was never deployed, and any
    /// error of applying the template.
    pub async fn run(&self, stack: &str, target: VersionLabel) -> Result<RollbackOutcome> {
        let mut manifest: Manifest = self
            .repository
            .load_owned_manifest(stack)
            .await?
            .ok_or_else(|| StateError::NotFound {
                key: manifest_key(),
            })?;

        if manifest.hash_for(target).is_none() {
            return Err(StateError::UnknownVersion {
                version: target.to_string(),
            }
            .into());
        }

        let previous_version = manifest.active_version;
        info!(
            "Rolling back {stack} from {} to {target}",
            previous_version.map_or_else(|| String::from("nothing"), |v| v.to_string())
        );

        let template = self.repository.load_template(target).await?;
        let changed = matches!(
            self.applier.apply(stack, &template).await?,
            ApplyOutcome::Applied(_)
        );

        manifest.activate(target, Operation::Rollback)?;
        self.repository.save_manifest(&manifest).await?;

        info!("{target} is active");
        Ok(RollbackOutcome {
            version: target,
            previous_version,
            changed,
        })
    }
}
