use crate::RuntimeError;
use kiln_schema::{FileRules, Recipe};
use std::path::{Path, PathBuf};

/// Fetches package sources and turns them into archive artifacts.
pub trait BuildBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Make `dest` a current checkout of the recipe repository at `remote`.
    fn sync_recipes(&self, remote: &str, dest: &Path) -> Result<(), RuntimeError>;

    /// Fetch the sources described by `recipe` into `workspace` and return
    /// the version string to build them as.
    fn checkout(
        &self,
        name: &str,
        recipe: &Recipe,
        workspace: &Path,
    ) -> Result<String, RuntimeError>;

    /// Assemble the files selected by `files` into an artifact in
    /// `output_dir` and return its path.
    fn build_package(
        &self,
        name: &str,
        version: &str,
        files: &FileRules,
        workspace: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, RuntimeError> {
        crate::package::build_package(name, version, files, workspace, output_dir)
    }
}

pub fn select_backend(name: &str) -> Result<Box<dyn BuildBackend>, RuntimeError> {
    match name {
        "git" => Ok(Box::new(crate::git::GitBackend::new())),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}
