use crate::backend::BuildBackend;
use crate::host::HostPackageManager;
use crate::RuntimeError;
use kiln_schema::{ArchiveIndex, FileRules, Recipe};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, RuntimeError> {
    m.lock()
        .map_err(|e| RuntimeError::Host(format!("mutex poisoned: {e}")))
}

#[derive(Default)]
struct HostState {
    archives: BTreeMap<String, PathBuf>,
    available: BTreeMap<String, ArchiveIndex>,
    installed: Vec<String>,
    registrations: usize,
    refreshes: usize,
}

/// In-process host package manager.
///
/// `refresh_archive` reads the registered archive's index from disk and
/// `install` only succeeds for names that some refreshed index lists.
/// Clones share state, so a test can keep a handle after boxing one.
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host that already has `names` installed.
    pub fn with_installed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::new();
        if let Ok(mut state) = host.state.lock() {
            state.installed = names.into_iter().map(Into::into).collect();
        }
        host
    }

    /// Installed package names in installation order.
    pub fn installed(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.installed.clone())
            .unwrap_or_default()
    }

    pub fn registrations(&self) -> usize {
        self.state.lock().map(|s| s.registrations).unwrap_or(0)
    }

    pub fn refreshes(&self) -> usize {
        self.state.lock().map(|s| s.refreshes).unwrap_or(0)
    }
}

impl HostPackageManager for MockHost {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_installed(&self, name: &str) -> Result<bool, RuntimeError> {
        Ok(lock(&self.state)?.installed.iter().any(|n| n == name))
    }

    fn install(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state)?;
        if !state.available.values().any(|index| index.contains(name)) {
            return Err(RuntimeError::Host(format!(
                "package '{name}' is unavailable"
            )));
        }
        if !state.installed.iter().any(|n| n == name) {
            state.installed.push(name.to_owned());
        }
        Ok(())
    }

    fn register_archive(&self, name: &str, dir: &Path) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state)?;
        state.archives.insert(name.to_owned(), dir.to_path_buf());
        state.registrations += 1;
        Ok(())
    }

    fn refresh_archive(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = lock(&self.state)?;
        let dir = state
            .archives
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Host(format!("archive '{name}' is not registered")))?;
        let index = kiln_store::read_index(&dir)?;
        state.available.insert(name.to_owned(), index);
        state.refreshes += 1;
        Ok(())
    }
}

/// Fixture data for one package served by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPackage {
    pub version: String,
    /// `(name, minimum version)` pairs written to `Package-Requires`.
    pub requires: Vec<(String, String)>,
    /// Additional library files, which turn the package into a tar.
    pub extra_files: Vec<String>,
    /// Produce an artifact with no readable description.
    pub corrupt: bool,
}

impl Default for MockPackage {
    fn default() -> Self {
        Self {
            version: "0.0.1".to_owned(),
            requires: Vec::new(),
            extra_files: Vec::new(),
            corrupt: false,
        }
    }
}

impl MockPackage {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_owned(),
            ..Self::default()
        }
    }

    pub fn requires(mut self, name: &str, version: &str) -> Self {
        self.requires.push((name.to_owned(), version.to_owned()));
        self
    }

    pub fn with_file(mut self, file: &str) -> Self {
        self.extra_files.push(file.to_owned());
        self
    }

    pub fn corrupt(mut self) -> Self {
        self.corrupt = true;
        self
    }

    fn library(&self, name: &str) -> String {
        let requires: Vec<String> = self
            .requires
            .iter()
            .map(|(n, v)| format!("({n} \"{v}\")"))
            .collect();
        format!(
            ";;; {name}.el --- Mock package {name}\n;; Version: {}\n;; Package-Requires: ({})\n;;; Code:\n(provide '{name})\n;;; {name}.el ends here\n",
            self.version,
            requires.join(" ")
        )
    }
}

/// In-process build backend serving generated sources from a fixture table.
///
/// Packages missing from the table are generated at version `0.0.1` with no
/// dependencies. Clones share state.
#[derive(Clone, Default)]
pub struct MockBackend {
    packages: Arc<Mutex<HashMap<String, MockPackage>>>,
    checkouts: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(self, name: &str, package: MockPackage) -> Self {
        if let Ok(mut packages) = self.packages.lock() {
            packages.insert(name.to_owned(), package);
        }
        self
    }

    /// Package names checked out so far, in order.
    pub fn checkouts(&self) -> Vec<String> {
        self.checkouts
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    fn fixture(&self, name: &str) -> Result<MockPackage, RuntimeError> {
        Ok(lock(&self.packages)?.get(name).cloned().unwrap_or_default())
    }
}

impl BuildBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn sync_recipes(&self, _remote: &str, dest: &Path) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(dest.join("recipes"))?;
        Ok(())
    }

    fn checkout(
        &self,
        name: &str,
        _recipe: &Recipe,
        workspace: &Path,
    ) -> Result<String, RuntimeError> {
        let package = self.fixture(name)?;
        std::fs::create_dir_all(workspace)?;
        std::fs::write(workspace.join(format!("{name}.el")), package.library(name))?;
        for file in &package.extra_files {
            std::fs::write(
                workspace.join(file),
                format!(";;; {file} --- Part of {name}\n"),
            )?;
        }
        lock(&self.checkouts)?.push(name.to_owned());
        Ok(package.version)
    }

    fn build_package(
        &self,
        name: &str,
        version: &str,
        files: &FileRules,
        workspace: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, RuntimeError> {
        if self.fixture(name)?.corrupt {
            std::fs::create_dir_all(output_dir)?;
            let path = output_dir.join(format!("{name}-{version}.el"));
            std::fs::write(&path, "corrupt")?;
            return Ok(path);
        }
        crate::package::build_package(name, version, files, workspace, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::ArtifactKind;

    fn recipe(name: &str) -> Recipe {
        Recipe::parse(&format!("({name} :fetcher git :url \"mock://{name}\")")).unwrap()
    }

    #[test]
    fn default_fixture_builds_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new();
        let ws = dir.path().join("ws");
        let version = backend.checkout("foo", &recipe("foo"), &ws).unwrap();
        assert_eq!(version, "0.0.1");

        let path = backend
            .build_package("foo", &version, &FileRules::default(), &ws, dir.path())
            .unwrap();
        let desc = kiln_store::try_extract(&path).unwrap();
        assert_eq!(desc.kind, ArtifactKind::Single);
        assert!(desc.dependencies.is_empty());
        assert_eq!(backend.checkouts(), vec!["foo"]);
    }

    #[test]
    fn fixture_with_files_and_requires_builds_tar() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().with_package(
            "bar",
            MockPackage::new("1.2").requires("foo", "0.0.1").with_file("bar-util.el"),
        );
        let ws = dir.path().join("ws");
        let version = backend.checkout("bar", &recipe("bar"), &ws).unwrap();
        let path = backend
            .build_package("bar", &version, &FileRules::default(), &ws, dir.path())
            .unwrap();
        let desc = kiln_store::try_extract(&path).unwrap();
        assert_eq!(desc.kind, ArtifactKind::Multi);
        assert_eq!(desc.dependencies[0].name, "foo");
    }

    #[test]
    fn corrupt_fixture_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().with_package("bad", MockPackage::default().corrupt());
        let ws = dir.path().join("ws");
        let version = backend.checkout("bad", &recipe("bad"), &ws).unwrap();
        let path = backend
            .build_package("bad", &version, &FileRules::default(), &ws, dir.path())
            .unwrap();
        assert!(kiln_store::extract(&path).is_none());
    }

    #[test]
    fn host_installs_only_indexed_packages() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("foo-1.el"),
            ";;; foo.el --- Foo\n;; Version: 1\n;;; Code:\n",
        )
        .unwrap();
        kiln_store::write_index(dir.path()).unwrap();

        let host = MockHost::new();
        let handle = host.clone();
        host.register_archive("kiln", dir.path()).unwrap();
        assert!(host.install("foo").is_err());

        host.refresh_archive("kiln").unwrap();
        host.install("foo").unwrap();
        assert!(host.install("bar").is_err());
        assert!(handle.is_installed("foo").unwrap());
        assert_eq!(handle.installed(), vec!["foo"]);
        assert_eq!(handle.registrations(), 1);
        assert_eq!(handle.refreshes(), 1);
    }

    #[test]
    fn refresh_without_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        host.register_archive("kiln", dir.path()).unwrap();
        assert!(host.refresh_archive("kiln").is_err());
        assert!(host.refresh_archive("other").is_err());
    }

    #[test]
    fn preinstalled_packages_are_reported() {
        let host = MockHost::with_installed(["dash"]);
        assert!(host.is_installed("dash").unwrap());
        assert!(!host.is_installed("s").unwrap());
    }
}
