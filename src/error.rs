//! Error types for the Halldyll function deployment system.
//!
//! This module provides the error hierarchy for every stage of a deployment:
//! configuration, manifest and blob storage, the remote control plane,
//! packaging, post-deploy verification and the pipeline itself.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Halldyll function deployment system.
#[derive(Debug, Error)]
pub enum HalldyllError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Manifest and blob storage errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote control plane errors.
    #[error("Control plane error: {0}")]
    Remote(#[from] RemoteError),

    /// Artifact packaging errors.
    #[error("Packaging error: {0}")]
    Package(#[from] PackageError),

    /// Post-deploy verification errors.
    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),

    /// Pipeline control errors.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A trigger is missing one of its required fields.
    #[error("Function '{function}': {trigger} trigger is missing required field '{field}'")]
    MissingTriggerField {
        /// Function owning the trigger.
        function: String,
        /// Trigger kind.
        trigger: String,
        /// Name of the missing field.
        field: String,
    },

    /// Invalid function name.
    #[error("Invalid function name: {name}")]
    InvalidFunctionName {
        /// The rejected name.
        name: String,
    },

    /// Malformed route path.
    #[error("Malformed route path '{path}': {reason}")]
    MalformedPath {
        /// The rejected path.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// A project already exists where one was about to be created.
    #[error("Project already exists at {path} (use --force to overwrite)")]
    ProjectExists {
        /// Existing project file.
        path: PathBuf,
    },
}

/// Manifest and blob storage errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Object not found in the blob store.
    #[error("Object not found: {key}")]
    NotFound {
        /// Key of the missing object.
        key: String,
    },

    /// Stored data is corrupted.
    #[error("Stored state is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The bucket belongs to another application.
    #[error("Bucket belongs to application '{found}', expected '{expected}'")]
    IdentityMismatch {
        /// Identifier of the local project.
        expected: String,
        /// Identifier recorded in the remote manifest.
        found: String,
    },

    /// Version label is not known to the manifest.
    #[error("Unknown version: {version}")]
    UnknownVersion {
        /// The requested version label.
        version: String,
    },

    /// Version label could not be parsed.
    #[error("Invalid version label: {label}")]
    InvalidVersion {
        /// The rejected label.
        label: String,
    },

    /// Blob storage backend error.
    #[error("Blob store error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Remote control plane errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Authentication failed.
    #[error("Control plane authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Control plane request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// Rate limited.
    #[error("Control plane rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Network error.
    #[error("Network error communicating with control plane: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from control plane: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The stack update carried no changes.
    #[error("No updates are to be performed on stack {stack}")]
    NoChanges {
        /// Stack name.
        stack: String,
    },

    /// The in-flight update could not be cancelled from the current status.
    #[error("Cannot cancel update of stack {stack} from status {status}")]
    CannotCancel {
        /// Stack name.
        stack: String,
        /// Status reported by the control plane.
        status: String,
    },

    /// Stack not found.
    #[error("Stack not found: {stack}")]
    StackNotFound {
        /// Stack name.
        stack: String,
    },

    /// Stack operation settled in a failure status.
    #[error("Stack {stack} settled in {status}: {reason}")]
    StackFailed {
        /// Stack name.
        stack: String,
        /// Terminal status.
        status: String,
        /// Status reason reported by the control plane.
        reason: String,
    },

    /// Timeout waiting for an operation to settle.
    #[error("Timeout after {waited_secs}s waiting for {operation}")]
    Timeout {
        /// Operation being waited on.
        operation: String,
        /// Seconds waited.
        waited_secs: u64,
    },
}

/// Artifact packaging errors.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Function source directory is missing.
    #[error("Source directory for function '{function}' not found: {path}")]
    SourceNotFound {
        /// Function name.
        function: String,
        /// Expected source path.
        path: PathBuf,
    },

    /// Walking the source tree failed.
    #[error("Failed to walk source tree: {message}")]
    Walk {
        /// Description of the walk error.
        message: String,
    },

    /// Invalid exclude pattern.
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// Parser message.
        message: String,
    },

    /// Writing the archive failed.
    #[error("Failed to archive function '{function}': {message}")]
    Archive {
        /// Function name.
        function: String,
        /// Description of the archive error.
        message: String,
    },
}

/// Post-deploy verification errors.
///
/// These are raised after the infrastructure apply succeeded, so a rollback
/// candidate exists when one of them is reported.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// The function answered the sentinel request with something else.
    #[error("Smoke test failed for '{function}': status {status}, payload {payload}")]
    SmokeTestFailed {
        /// Deployed function name.
        function: String,
        /// Status code returned by the invoke call.
        status: u16,
        /// Payload returned by the function.
        payload: String,
    },

    /// The invoke call itself failed.
    #[error("Smoke test could not invoke '{function}': {message}")]
    InvokeFailed {
        /// Deployed function name.
        function: String,
        /// Description of the failure.
        message: String,
    },
}

/// Pipeline control errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run was interrupted by the operator.
    #[error("Deployment interrupted during {state}")]
    Interrupted {
        /// Pipeline state when the signal arrived.
        state: String,
    },

    /// The in-flight update was cancelled.
    #[error("Update of stack {stack} was cancelled")]
    Cancelled {
        /// Stack name.
        stack: String,
    },

    /// A concurrent task failed to complete.
    #[error("Concurrent task failed: {message}")]
    TaskFailed {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for Halldyll operations.
pub type Result<T> = std::result::Result<T, HalldyllError>;

impl HalldyllError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is the "no changes to apply" pseudo-error.
    #[must_use]
    pub const fn is_no_changes(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::NoChanges { .. }))
    }

    /// Returns true if an update cancel was refused because the update had
    /// already finished.
    #[must_use]
    pub const fn is_cannot_cancel(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::CannotCancel { .. }))
    }

    /// Returns true if this error is transient.
    ///
    /// The pipeline never retries on its own; callers use this to decide
    /// whether a rerun is worthwhile.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote(RemoteError::RateLimited { .. } | RemoteError::NetworkError { .. })
        )
    }

    /// Returns true if the error was raised after the infrastructure apply
    /// succeeded.
    #[must_use]
    pub const fn is_verification(&self) -> bool {
        matches!(self, Self::Verification(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl StateError {
    /// Creates a storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_changes_is_classified() {
        let err = HalldyllError::from(RemoteError::NoChanges {
            stack: String::from("app"),
        });
        assert!(err.is_no_changes());
        assert!(!err.is_cannot_cancel());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_verification_is_distinct_from_remote() {
        let err = HalldyllError::from(VerificationError::SmokeTestFailed {
            function: String::from("app-users"),
            status: 200,
            payload: String::from("{}"),
        });
        assert!(err.is_verification());

        let remote = HalldyllError::from(RemoteError::network("reset"));
        assert!(!remote.is_verification());
        assert!(remote.is_retryable());
    }
}
