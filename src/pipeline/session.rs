//! The mutable context of one deployment run.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::{DeployConfig, FunctionSpec, RoutesConfig};
use crate::error::{HalldyllError, Result, StateError};
use crate::package::{Artifact, SourceHasher, SourceTree, function_tree};
use crate::state::{Manifest, VersionLabel};
use crate::template::{ResourceGraph, Template, compile_routes};

use super::state::{Checkpoint, PipelineState, StateTracker};

/// Configuration copy stored with every version and mixed into its digest.
#[derive(Debug, Serialize)]
struct ConfigSnapshot<'a> {
    functions: &'a [FunctionSpec],
    routes: &'a RoutesConfig,
}

/// Everything one run knows and produces.
///
/// A session is owned by exactly one pipeline run and handed to every stage
/// by mutable reference.
#[derive(Debug)]
pub struct DeploymentSession {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// Loaded configuration.
    pub config: DeployConfig,
    /// Stack holding the application.
    pub stack: String,
    /// Directory holding one sub-directory per function.
    pub source_root: PathBuf,
    /// Resolved function registry.
    pub functions: Vec<FunctionSpec>,
    /// Compiled route registry.
    pub routes: ResourceGraph,
    /// Local copy of the manifest, persisted at the end of a successful run.
    pub manifest: Manifest,
    /// Digest of sources and configuration.
    pub digest: Option<String>,
    /// Packaged functions.
    pub artifacts: Vec<Artifact>,
    /// Last template applied by the run.
    pub template: Option<Template>,
    /// Public base URL of the API.
    pub base_url: Option<String>,
    tracker: StateTracker,
    work_dir: Option<TempDir>,
}

impl DeploymentSession {
    /// Creates a session for a configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the route registry does not compile.
    pub fn new(config: DeployConfig, source_root: impl Into<PathBuf>) -> Result<Self> {
        let routes = compile_routes(&config.routes.paths, config.routes.default.cors)?;
        let functions = config.resolved_functions();
        let stack = config.project.stack_name();
        let manifest = Manifest::new(stack.clone());

        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            stack,
            source_root: source_root.into(),
            functions,
            routes,
            manifest,
            digest: None,
            artifacts: Vec::new(),
            template: None,
            base_url: None,
            tracker: StateTracker::new(),
            work_dir: None,
        })
    }

    /// Identifier stored in the manifest.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.stack
    }

    /// Tracker publishing this session's checkpoints.
    #[must_use]
    pub fn tracker(&self) -> StateTracker {
        self.tracker.clone()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.tracker.state()
    }

    /// Latest checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.tracker.checkpoint()
    }

    /// Moves to `state`.
    pub fn transition(&self, state: PipelineState) {
        self.tracker.transition(state);
    }

    /// Version active before this run.
    #[must_use]
    pub fn previous_version(&self) -> Option<VersionLabel> {
        self.tracker.checkpoint().previous_version
    }

    /// Version this run deploys.
    #[must_use]
    pub fn version(&self) -> Option<VersionLabel> {
        self.tracker.checkpoint().version
    }

    /// Records the versions involved in the run.
    pub fn set_versions(&self, previous: Option<VersionLabel>, version: Option<VersionLabel>) {
        self.tracker.set_versions(previous, version);
    }

    /// Version this run deploys, failing if none was decided yet.
    ///
    /// # Errors
    ///
    /// Returns an internal error when called before the diff stage.
    pub fn require_version(&self) -> Result<VersionLabel> {
        self.version()
            .ok_or_else(|| HalldyllError::internal("no version decided for this run"))
    }

    /// Temporary directory holding the run's archives, created on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn work_dir(&mut self) -> Result<PathBuf> {
        if let Some(dir) = &self.work_dir {
            return Ok(dir.path().to_path_buf());
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("halldyll-{}-", self.run_id.simple()))
            .tempdir()?;
        debug!("Created work directory {}", dir.path().display());
        let path = dir.path().to_path_buf();
        self.work_dir = Some(dir);
        Ok(path)
    }

    /// Serialized configuration copy.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn config_snapshot(&self) -> Result<String> {
        serde_json::to_string_pretty(&ConfigSnapshot {
            functions: &self.functions,
            routes: &self.config.routes,
        })
        .map_err(|e| {
            HalldyllError::State(StateError::serialization(format!(
                "Failed to serialize configuration: {e}"
            )))
        })
    }

    /// Source trees and configuration copy the run's digest is computed
    /// from.
    ///
    /// # Errors
    ///
    /// Returns an error if a function directory is missing or the
    /// configuration cannot be serialized.
    pub fn digest_inputs(&self) -> Result<(Vec<SourceTree>, String)> {
        let trees = self
            .functions
            .iter()
            .map(|function| function_tree(function, &self.source_root))
            .collect::<Result<Vec<_>>>()?;
        Ok((trees, self.config_snapshot()?))
    }

    /// Drops packaged artifacts and removes the work directory.
    pub fn discard_artifacts(&mut self) {
        self.artifacts.clear();
        if let Some(dir) = self.work_dir.take() {
            debug!("Removing work directory {}", dir.path().display());
            if let Err(e) = dir.close() {
                warn!("Failed to remove work directory: {e}");
            }
        }
    }

    /// Removes the work directory after a failure, logging what is deleted.
    pub fn cleanup(&mut self) {
        let Some(dir) = self.work_dir.as_ref() else {
            return;
        };

        for path in archive_paths(dir.path()) {
            info!("Removing {}", path.display());
        }
        self.discard_artifacts();
    }
}

/// Digest of every function tree, in declaration order, followed by the
/// configuration copy. Blocking.
///
/// # Errors
///
/// Returns an error if a tree cannot be walked or a file cannot be read.
pub fn project_digest(trees: &[SourceTree], config_snapshot: &str) -> Result<String> {
    let mut hasher = SourceHasher::new();
    for tree in trees {
        hasher.update_tree(tree)?;
    }
    hasher.update_bytes(config_snapshot.as_bytes());
    Ok(hasher.finalize())
}

fn archive_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect()
}
