//! Deployment state for the Halldyll function deployment system.
//!
//! This module provides:
//! - The deployment manifest and version labels
//! - The blob store abstraction with S3 and filesystem backends
//! - Typed access to the manifest and versioned copies in the bucket

mod local;
mod repository;
mod s3;
mod store;
mod types;

pub use local::FsBlobStore;
pub use repository::{
    DeploymentRepository, artifact_key, config_key, manifest_key, template_key,
};
pub use s3::S3BlobStore;
pub use store::{BlobStore, JSON_CONTENT_TYPE, ZIP_CONTENT_TYPE};
pub use types::{
    HistoryEntry, MAX_HISTORY_ENTRIES, Manifest, Operation, VersionDecision, VersionLabel,
};
