//! Source tree checksums for change detection.
//!
//! Every regular file of every tree is streamed into one cumulative SHA-256.
//! Files are visited in lexicographic order of their `/`-separated path
//! relative to the tree root, and each file contributes its relative path
//! followed by its bytes. The digest therefore depends only on file paths,
//! file contents and the exclude patterns, never on directory iteration
//! order.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use glob::Pattern;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{PackageError, Result};

/// Compiled exclude globs, matched against relative paths.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    /// Compiled patterns.
    patterns: Vec<Pattern>,
}

/// A directory to hash, with its own exclude set.
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Label mixed into the digest ahead of the tree's files.
    pub label: String,
    /// Root directory.
    pub root: PathBuf,
    /// Files to leave out.
    pub excludes: ExcludeSet,
}

/// A regular file selected from a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the tree root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub path: PathBuf,
}

/// Incremental hasher over source trees.
#[derive(Debug, Default)]
pub struct SourceHasher {
    hasher: Sha256,
}

impl ExcludeSet {
    /// Compiles a list of glob patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| PackageError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Returns true if the relative path matches any pattern.
    #[must_use]
    pub fn is_excluded(&self, relative: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(relative))
    }
}

impl SourceTree {
    /// Creates a tree description from a root and raw patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid glob.
    pub fn new<S: AsRef<str>>(
        label: impl Into<String>,
        root: impl Into<PathBuf>,
        patterns: &[S],
    ) -> Result<Self> {
        Ok(Self {
            label: label.into(),
            root: root.into(),
            excludes: ExcludeSet::new(patterns)?,
        })
    }

    /// Lists the regular files of the tree, sorted by relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    pub fn files(&self) -> Result<Vec<SourceFile>> {
        collect_files(&self.root, &self.excludes)
    }
}

/// Lists the regular files under `root` that are not excluded, sorted by
/// relative path. Directories and symlinks are skipped.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked.
pub fn collect_files(root: &Path, excludes: &ExcludeSet) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| PackageError::Walk {
            message: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(root, entry.path());
        if excludes.is_excluded(&relative) {
            continue;
        }

        files.push(SourceFile {
            relative,
            path: entry.into_path(),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Computes the cumulative digest of a set of source trees.
///
/// Trees are hashed in the order given.
///
/// # Errors
///
/// Returns an error if a tree cannot be walked or a file cannot be read.
pub fn compute_checksum(trees: &[SourceTree]) -> Result<String> {
    let mut hasher = SourceHasher::new();
    for tree in trees {
        hasher.update_tree(tree)?;
    }
    Ok(hasher.finalize())
}

impl SourceHasher {
    /// Creates an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams every file of a tree into the digest.
    ///
    /// Each file is framed as its relative path, a NUL, its length as a
    /// little-endian `u64`, then its contents. The tree label is followed by
    /// the file count so file lists cannot run into each other.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked or a file cannot be read.
    pub fn update_tree(&mut self, tree: &SourceTree) -> Result<()> {
        let files = tree.files()?;

        self.hasher.update(tree.label.as_bytes());
        self.hasher.update(b"\0");
        self.hasher.update((files.len() as u64).to_le_bytes());

        for file in files {
            self.hasher.update(file.relative.as_bytes());
            self.hasher.update(b"\0");
            self.update_file(&file.path)?;
        }

        Ok(())
    }

    /// Mixes raw bytes into the digest.
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Streams one file's contents into the digest.
    fn update_file(&mut self, path: &Path) -> Result<()> {
        let mut file = File::open(path)?;
        self.hasher.update(file.metadata()?.len().to_le_bytes());
        let mut buffer = [0u8; 8192];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            self.hasher.update(&buffer[..read]);
        }

        Ok(())
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn finalize(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Builds the `/`-separated path of `path` relative to `root`.
fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Returns the first `len` characters of a digest for display.
#[must_use]
pub fn short_hash(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}
