//! Control plane wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackStatus {
    /// Creation in progress.
    CreateInProgress,
    /// Created.
    CreateComplete,
    /// Creation failed.
    CreateFailed,
    /// Failed creation is being rolled back.
    RollbackInProgress,
    /// Failed creation was rolled back.
    RollbackComplete,
    /// Rolling back a failed creation failed.
    RollbackFailed,
    /// Update in progress.
    UpdateInProgress,
    /// Update done, old resources being removed.
    UpdateCompleteCleanupInProgress,
    /// Updated.
    UpdateComplete,
    /// Update failed or was cancelled and is being rolled back.
    UpdateRollbackInProgress,
    /// Update rollback done, new resources being removed.
    UpdateRollbackCompleteCleanupInProgress,
    /// Update rolled back.
    UpdateRollbackComplete,
    /// Update rollback failed.
    UpdateRollbackFailed,
    /// Deletion in progress.
    DeleteInProgress,
    /// Deleted.
    DeleteComplete,
    /// Deletion failed.
    DeleteFailed,
    /// Any status this client does not know.
    #[serde(other)]
    Unknown,
}

/// Operation a waiter is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOperation {
    /// Stack creation.
    Create,
    /// Template update.
    Update,
    /// Cancellation of an in-flight update.
    Cancel,
    /// Stack deletion.
    Delete,
}

/// Stack as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Reason attached to the status, if any.
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Last change time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A deployed function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    /// Deployed name.
    pub name: String,
    /// Handler reference.
    #[serde(default)]
    pub handler: Option<String>,
    /// Memory in MB.
    #[serde(default)]
    pub memory: Option<u32>,
    /// Last modification time.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of a synchronous invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokeResult {
    /// Status code of the invoke call.
    pub status_code: u16,
    /// Payload returned by the function.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Set when the function raised instead of returning.
    #[serde(default)]
    pub function_error: Option<String>,
}

/// A log stream of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStream {
    /// Stream name.
    pub name: String,
    /// Timestamp of the newest event.
    #[serde(default)]
    pub last_event_at: Option<DateTime<Utc>>,
}

/// A single log event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Event time.
    pub timestamp: DateTime<Utc>,
    /// Stream the event belongs to.
    pub stream: String,
    /// Message text.
    pub message: String,
}

/// Filter for a log event query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogQuery {
    /// Log group, one per deployed function.
    pub log_group: String,
    /// Streams to search, empty for all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<String>,
    /// Inclusive lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Filter pattern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Continuation token from the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// One page of log events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPage {
    /// Events of the page.
    #[serde(default)]
    pub events: Vec<LogEvent>,
    /// Token for the next page, absent on the last one.
    #[serde(default)]
    pub next_token: Option<String>,
}

impl StackStatus {
    /// Returns true while the stack is still changing.
    #[must_use]
    pub const fn is_in_progress(self) -> bool {
        matches!(
            self,
            Self::CreateInProgress
                | Self::RollbackInProgress
                | Self::UpdateInProgress
                | Self::UpdateCompleteCleanupInProgress
                | Self::UpdateRollbackInProgress
                | Self::UpdateRollbackCompleteCleanupInProgress
                | Self::DeleteInProgress
        )
    }

    /// Returns true if the status is the successful end of `operation`.
    #[must_use]
    pub const fn is_success_for(self, operation: StackOperation) -> bool {
        match operation {
            StackOperation::Create => matches!(self, Self::CreateComplete),
            StackOperation::Update => matches!(self, Self::UpdateComplete),
            StackOperation::Cancel => matches!(self, Self::UpdateRollbackComplete),
            StackOperation::Delete => matches!(self, Self::DeleteComplete),
        }
    }

    /// Returns true if a stack in this status accepts template updates.
    #[must_use]
    pub const fn is_updatable(self) -> bool {
        matches!(
            self,
            Self::CreateComplete | Self::UpdateComplete | Self::UpdateRollbackComplete
        )
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for StackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for StackOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Cancel => "cancel",
            Self::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

impl StackDescription {
    /// Creates a description with no reason attached.
    #[must_use]
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            status,
            status_reason: None,
            updated_at: None,
        }
    }
}

impl InvokeResult {
    /// Returns true if the call succeeded and the function did not raise.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code) && self.function_error.is_none()
    }
}
