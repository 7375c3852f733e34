//! Applying templates to a stack and waiting for the result.
//!
//! Deploy, rollback, interrupt handling and destroy all go through
//! [`StackApplier`].

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::remote::{ControlPlane, StackDescription, StackOperation, StackWaiter};

/// What happened to an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update ran and settled.
    Applied(StackDescription),
    /// The stack already matched the template. No wait was needed.
    NoChanges,
}

/// Issues stack operations and waits for them to settle.
#[derive(Clone)]
pub struct StackApplier {
    control: Arc<dyn ControlPlane>,
    waiter: StackWaiter,
}

impl std::fmt::Debug for StackApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackApplier")
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

impl StackApplier {
    /// Creates an applier.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>, waiter: StackWaiter) -> Self {
        Self { control, waiter }
    }

    /// The control plane operations go to.
    #[must_use]
    pub fn control(&self) -> &Arc<dyn ControlPlane> {
        &self.control
    }

    /// Creates a stack and waits for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the stack does not settle in
    /// `CREATE_COMPLETE`.
    pub async fn create(&self, stack: &str, template: &str) -> Result<StackDescription> {
        info!("Creating stack {stack}");
        self.control.create_stack(stack, template).await?;
        self.waiter.wait(stack, StackOperation::Create).await
    }

    /// Updates a stack and waits for it.
    ///
    /// A "no changes" answer is success and skips the wait.
    ///
    /// # Errors
    ///
    /// Returns any other error of the call or the wait.
    pub async fn apply(&self, stack: &str, template: &str) -> Result<ApplyOutcome> {
        match self.control.update_stack(stack, template).await {
            Ok(()) => {
                let description = self.waiter.wait(stack, StackOperation::Update).await?;
                Ok(ApplyOutcome::Applied(description))
            }
            Err(e) if e.is_no_changes() => {
                info!("Stack {stack} is already up to date");
                Ok(ApplyOutcome::NoChanges)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels the in-flight update and waits for the rollback.
    ///
    /// # Errors
    ///
    /// Returns the control plane's error unchanged, including the "cannot
    /// cancel" answer given once the update already finished.
    pub async fn cancel(&self, stack: &str) -> Result<StackDescription> {
        info!("Cancelling update of stack {stack}");
        self.control.cancel_update(stack).await?;
        self.waiter.wait(stack, StackOperation::Cancel).await
    }

    /// Deletes a stack and waits until it is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the deletion does not settle.
    pub async fn delete(&self, stack: &str) -> Result<StackDescription> {
        info!("Deleting stack {stack}");
        self.control.delete_stack(stack).await?;
        self.waiter.wait(stack, StackOperation::Delete).await
    }
}
