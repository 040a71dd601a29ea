//! Build backends and host package managers for kiln.
//!
//! This crate implements the execution layer: the pluggable `BuildBackend`
//! trait that fetches sources and assembles artifacts (git-based and mock),
//! the `HostPackageManager` trait that drives the editor's package manager
//! (batch Emacs and mock), the file-rule driven packager shared by every
//! backend, and prerequisite checking for the external tools.

pub mod backend;
pub mod emacs;
pub mod git;
pub mod host;
pub mod mock;
pub mod package;
pub mod prereq;

pub use backend::{select_backend, BuildBackend};
pub use emacs::EmacsHost;
pub use git::GitBackend;
pub use host::{select_host, HostPackageManager};
pub use mock::{MockBackend, MockHost, MockPackage};
pub use package::{build_package, select_files, SelectedFile};
pub use prereq::{check_emacs_prereqs, check_git_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("package '{name}': fetcher '{fetcher}' is not supported by this backend")]
    UnsupportedFetcher { name: String, fetcher: String },
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("host package manager: {0}")]
    Host(String),
    #[error("invalid package description: {0}")]
    Descriptor(#[from] kiln_schema::DescriptorError),
    #[error(transparent)]
    Store(#[from] kiln_store::StoreError),
}
