use crate::StoreError;
use kiln_schema::{PackageDescriptor, INDEX_FILE_NAME};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout under the kiln root.
///
/// Manages paths for the archive directory, per-package build workspaces,
/// the recipe repository checkout, and the archive lock. Directories are
/// created on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Built artifacts plus the index; registered with the host as an archive.
    #[inline]
    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    #[inline]
    pub fn index_file(&self) -> PathBuf {
        self.archive_dir().join(INDEX_FILE_NAME)
    }

    #[inline]
    pub fn build_dir(&self) -> PathBuf {
        self.root.join("build")
    }

    /// Scratch checkout for one package. Wiped at the start of each build.
    #[inline]
    pub fn workspace(&self, name: &str) -> PathBuf {
        self.build_dir().join(name)
    }

    #[inline]
    pub fn recipes_repo_dir(&self) -> PathBuf {
        self.root.join("recipes-repo")
    }

    /// One file per package, each holding a recipe literal.
    #[inline]
    pub fn recipes_dir(&self) -> PathBuf {
        self.recipes_repo_dir().join("recipes")
    }

    #[inline]
    pub fn recipe_file(&self, name: &str) -> PathBuf {
        self.recipes_dir().join(name)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Canonical artifact path for `desc` inside the archive directory.
    pub fn artifact_path(&self, desc: &PackageDescriptor) -> PathBuf {
        crate::artifact_file_name(&self.archive_dir(), desc)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.archive_dir())?;
        fs::create_dir_all(self.build_dir())?;
        Ok(())
    }
}
