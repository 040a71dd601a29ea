//! Local package archive for kiln.
//!
//! This crate provides the storage layer: `ArchiveLayout` for the directory
//! structure under the kiln root, artifact classification and descriptor
//! extraction for built packages, canonical artifact naming, and the index
//! builder that regenerates `archive-contents` from the artifacts on disk
//! with an atomic replace.

pub mod artifact;
pub mod index;
pub mod layout;

pub use artifact::{
    artifact_file_name, classify, extract, format_for, try_extract, DescriptorFormat, SingleFile,
    TarArchive,
};
pub use index::{build_index, read_index, write_index};
pub use layout::ArchiveLayout;

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee that a rename survives a crash until the parent
/// directory is synced.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid package description: {0}")]
    Descriptor(#[from] kiln_schema::DescriptorError),
    #[error("invalid archive index: {0}")]
    Index(#[from] kiln_schema::IndexError),
    #[error("not a package artifact: {0}")]
    NotAnArtifact(String),
    #[error("no package description member in {0}")]
    MissingMember(String),
    #[error("malformed artifact: {0}")]
    Malformed(String),
}
