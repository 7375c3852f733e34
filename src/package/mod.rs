//! Source checksums and function packaging.

mod archive;
mod checksum;

pub use archive::{
    Artifact, ENTRY_DESCRIPTOR, PackageContext, function_dir, function_tree, package_all,
    package_function,
};
pub use checksum::{
    ExcludeSet, SourceFile, SourceHasher, SourceTree, collect_files, compute_checksum, short_hash,
};
