//! Function archives.
//!
//! Each function directory is zipped into the run's work directory together
//! with an entry descriptor telling the runtime shim which handler to call.
//! Entries are written in sorted order with a fixed timestamp so identical
//! sources produce identical archives.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::config::FunctionSpec;
use crate::error::{HalldyllError, PackageError, PipelineError, Result};
use crate::state::{VersionLabel, artifact_key};

use super::checksum::{SourceTree, compute_checksum};

/// Name of the entry descriptor inside every archive.
pub const ENTRY_DESCRIPTOR: &str = "halldyll.entry.json";

/// A packaged function ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Function name as declared.
    pub function: String,
    /// Archive on local disk.
    pub archive_path: PathBuf,
    /// Upload key in the deployment bucket.
    pub key: String,
    /// Checksum of the function's source tree.
    pub content_hash: String,
    /// Archive size.
    pub size_bytes: u64,
}

/// Inputs shared by every packaging task of a run.
#[derive(Debug, Clone)]
pub struct PackageContext {
    /// Directory holding one sub-directory per function.
    pub source_root: PathBuf,
    /// Directory the archives are written to.
    pub work_dir: PathBuf,
    /// Version being packaged.
    pub version: VersionLabel,
    /// Payload field that marks a smoke-test request.
    pub sentinel: String,
}

/// Descriptor read by the runtime shim.
#[derive(Debug, Serialize)]
struct EntryDescriptor<'a> {
    function: &'a str,
    handler: &'a str,
    healthcheck_field: &'a str,
}

/// Source directory of a function.
#[must_use]
pub fn function_dir(source_root: &Path, function: &str) -> PathBuf {
    source_root.join(function.trim_matches('/'))
}

/// Builds the source tree of a function, failing if its directory is missing.
///
/// # Errors
///
/// Returns [`PackageError::SourceNotFound`] if the directory does not exist,
/// or an error if an exclude pattern is invalid.
pub fn function_tree(spec: &FunctionSpec, source_root: &Path) -> Result<SourceTree> {
    let dir = function_dir(source_root, &spec.name);
    if !dir.is_dir() {
        return Err(PackageError::SourceNotFound {
            function: spec.name.clone(),
            path: dir,
        }
        .into());
    }

    SourceTree::new(&spec.name, dir, &spec.exclude)
}

/// Packages one function. Blocking.
///
/// # Errors
///
/// Returns an error if the source is missing or the archive cannot be
/// written.
pub fn package_function(spec: &FunctionSpec, context: &PackageContext) -> Result<Artifact> {
    let tree = function_tree(spec, &context.source_root)?;
    let content_hash = compute_checksum(std::slice::from_ref(&tree))?;

    let archive_path = context
        .work_dir
        .join(format!("{}.zip", spec.name.trim_matches('/').replace('/', "-")));

    let archive_err = |message: String| {
        HalldyllError::from(PackageError::Archive {
            function: spec.name.clone(),
            message,
        })
    };

    let file = File::create(&archive_path)
        .map_err(|e| archive_err(format!("create {}: {e}", archive_path.display())))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut entries = 0usize;
    for source in tree.files()? {
        if source.relative == ENTRY_DESCRIPTOR {
            debug!("Skipping user file shadowing {ENTRY_DESCRIPTOR}");
            continue;
        }

        writer
            .start_file(source.relative.as_str(), options)
            .map_err(|e| archive_err(e.to_string()))?;
        let mut input = File::open(&source.path)?;
        io::copy(&mut input, &mut writer)?;
        entries += 1;
    }

    let descriptor = serde_json::to_vec_pretty(&EntryDescriptor {
        function: &spec.name,
        handler: &spec.handler,
        healthcheck_field: &context.sentinel,
    })
    .map_err(|e| archive_err(e.to_string()))?;
    writer
        .start_file(ENTRY_DESCRIPTOR, options)
        .map_err(|e| archive_err(e.to_string()))?;
    writer.write_all(&descriptor)?;

    writer.finish().map_err(|e| archive_err(e.to_string()))?;

    let size_bytes = std::fs::metadata(&archive_path)?.len();
    debug!(
        "Packaged {} ({entries} files, {size_bytes} bytes)",
        spec.name
    );

    Ok(Artifact {
        function: spec.name.clone(),
        key: artifact_key(context.version, &spec.name, &content_hash),
        archive_path,
        content_hash,
        size_bytes,
    })
}

/// Packages every function concurrently on the blocking pool.
///
/// Artifacts are returned in the order of `functions`. The first failure
/// fails the whole batch.
///
/// # Errors
///
/// Returns the first packaging error, or [`PipelineError::TaskFailed`] if a
/// task panicked.
pub async fn package_all(
    functions: &[FunctionSpec],
    context: &PackageContext,
) -> Result<Vec<Artifact>> {
    let mut tasks = JoinSet::new();

    for (index, spec) in functions.iter().enumerate() {
        let spec = spec.clone();
        let context = context.clone();
        tasks.spawn_blocking(move || (index, package_function(&spec, &context)));
    }

    let mut packaged = Vec::with_capacity(functions.len());
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| PipelineError::TaskFailed {
            message: format!("packaging task: {e}"),
        })?;

        match result {
            Ok(artifact) => packaged.push((index, artifact)),
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    packaged.sort_by_key(|(index, _)| *index);
    let artifacts: Vec<Artifact> = packaged.into_iter().map(|(_, a)| a).collect();

    info!("Packaged {} functions", artifacts.len());
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn spec(name: &str) -> FunctionSpec {
        FunctionSpec {
            name: name.to_string(),
            handler: String::from("index.handler"),
            memory: 128,
            timeout: 6,
            exclude: vec![String::from("**/.git/**"), String::from("**/*.log")],
            triggers: Vec::new(),
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    fn context(source: &TempDir, work: &TempDir) -> PackageContext {
        PackageContext {
            source_root: source.path().to_path_buf(),
            work_dir: work.path().to_path_buf(),
            version: VersionLabel::new(2),
            sentinel: String::from("__healthcheck"),
        }
    }

    #[test]
    fn test_package_function_contents() {
        let source = TempDir::new().expect("temp dir");
        let work = TempDir::new().expect("temp dir");
        write(source.path(), "users/index.js", "exports.handler = 1");
        write(source.path(), "users/debug.log", "noise");

        let artifact = package_function(&spec("users"), &context(&source, &work)).expect("package");

        assert!(artifact.key.starts_with("halldyll/versions/v2/functions/users-"));
        assert!(artifact.size_bytes > 0);

        let file = File::open(&artifact.archive_path).expect("open archive");
        let mut archive = zip::ZipArchive::new(file).expect("read archive");
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec![ENTRY_DESCRIPTOR.to_string(), String::from("index.js")]);

        let mut descriptor = String::new();
        archive
            .by_name(ENTRY_DESCRIPTOR)
            .expect("descriptor")
            .read_to_string(&mut descriptor)
            .expect("read descriptor");
        let json: serde_json::Value = serde_json::from_str(&descriptor).expect("json");
        assert_eq!(json["handler"], "index.handler");
        assert_eq!(json["healthcheck_field"], "__healthcheck");
    }

    #[test]
    fn test_identical_sources_give_identical_archives() {
        let source = TempDir::new().expect("temp dir");
        write(source.path(), "users/index.js", "exports.handler = 1");

        let first_dir = TempDir::new().expect("temp dir");
        let second_dir = TempDir::new().expect("temp dir");
        let first = package_function(&spec("users"), &context(&source, &first_dir)).expect("package");
        let second =
            package_function(&spec("users"), &context(&source, &second_dir)).expect("package");

        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(
            std::fs::read(&first.archive_path).expect("read"),
            std::fs::read(&second.archive_path).expect("read")
        );
    }

    #[test]
    fn test_missing_source_dir() {
        let source = TempDir::new().expect("temp dir");
        let work = TempDir::new().expect("temp dir");

        let err = package_function(&spec("ghost"), &context(&source, &work)).unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Package(PackageError::SourceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_package_all_keeps_declaration_order() {
        let source = TempDir::new().expect("temp dir");
        let work = TempDir::new().expect("temp dir");
        for name in ["zeta", "alpha", "users/list"] {
            write(source.path(), &format!("{name}/index.js"), name);
        }

        let specs = vec![spec("zeta"), spec("alpha"), spec("users/list")];
        let artifacts = package_all(&specs, &context(&source, &work))
            .await
            .expect("package all");

        let names: Vec<_> = artifacts.iter().map(|a| a.function.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "users/list"]);
        assert!(artifacts[2].archive_path.ends_with("users-list.zip"));
    }

    #[tokio::test]
    async fn test_package_all_fails_on_any_error() {
        let source = TempDir::new().expect("temp dir");
        let work = TempDir::new().expect("temp dir");
        write(source.path(), "users/index.js", "ok");

        let specs = vec![spec("users"), spec("missing")];
        assert!(package_all(&specs, &context(&source, &work)).await.is_err());
    }
}
