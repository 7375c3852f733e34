//! Control plane contract.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{FunctionSummary, InvokeResult, LogPage, LogQuery, LogStream, StackDescription};

/// Message fragment the control plane uses when an update carries no
/// changes.
pub const NO_CHANGES_SIGNATURE: &str = "No updates are to be performed";

/// Message fragment the control plane uses when an update can no longer be
/// cancelled.
pub const CANNOT_CANCEL_SIGNATURE: &str = "cannot be called from current stack status";

/// Operations the orchestrator needs from the remote control plane.
///
/// Create, update, cancel and delete only start the operation; callers wait
/// for a terminal status with [`StackWaiter`](super::StackWaiter).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Describes a stack, `None` if it does not exist.
    async fn describe_stack(&self, stack: &str) -> Result<Option<StackDescription>>;

    /// Starts creating a stack from a template body.
    async fn create_stack(&self, stack: &str, template: &str) -> Result<()>;

    /// Starts updating a stack.
    ///
    /// Fails with [`RemoteError::NoChanges`](crate::error::RemoteError::NoChanges)
    /// when the template equals the applied one.
    async fn update_stack(&self, stack: &str, template: &str) -> Result<()>;

    /// Cancels the in-flight update.
    ///
    /// Fails with [`RemoteError::CannotCancel`](crate::error::RemoteError::CannotCancel)
    /// when the update already finished.
    async fn cancel_update(&self, stack: &str) -> Result<()>;

    /// Starts deleting a stack.
    async fn delete_stack(&self, stack: &str) -> Result<()>;

    /// Physical id of a resource of the stack.
    async fn describe_resource(&self, stack: &str, logical_id: &str) -> Result<String>;

    /// Lists deployed functions.
    async fn list_functions(&self) -> Result<Vec<FunctionSummary>>;

    /// Invokes a function synchronously.
    async fn invoke(&self, function: &str, payload: &serde_json::Value) -> Result<InvokeResult>;

    /// Lists the log streams of a log group, newest first.
    async fn list_log_streams(&self, log_group: &str) -> Result<Vec<LogStream>>;

    /// Returns one page of log events.
    async fn filter_log_events(&self, query: &LogQuery) -> Result<LogPage>;
}
