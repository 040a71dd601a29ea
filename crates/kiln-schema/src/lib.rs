//! Data formats for kiln.
//!
//! This crate defines the schema layer: a reader/printer for the Lisp data
//! subset used throughout (`Sexp`), package versions (`Version`), build
//! recipes (`Recipe`, `PackageRef`), package descriptors
//! (`PackageDescriptor`) with their two on-disk forms (library headers for
//! single-file packages, `define-package` files for multi-file packages), and
//! the `archive-contents` index (`ArchiveIndex`).

pub mod descriptor;
pub mod header;
pub mod index;
pub mod pkg_file;
pub mod recipe;
pub mod sexp;
pub mod types;
pub mod version;

pub use descriptor::{ArtifactKind, Dependency, DescriptorError, PackageDescriptor};
pub use header::{parse_header, parse_library, set_package_version, LibraryHeader};
pub use index::{ArchiveEntry, ArchiveIndex, IndexError, ARCHIVE_FORMAT_VERSION, INDEX_FILE_NAME};
pub use pkg_file::{parse_pkg_file, pkg_file_name, render_pkg_file};
pub use recipe::{
    FileRule, FileRules, Fetcher, PackageRef, Recipe, RecipeError, DEFAULT_EXCLUDE_GLOBS,
    DEFAULT_FILE_GLOBS,
};
pub use sexp::{Sexp, SexpError};
pub use types::{ArchiveName, PackageName, HOST_RUNTIME};
pub use version::Version;
