use crate::concurrency::ArchiveLock;
use crate::config::KilnConfig;
use crate::resolver::{package_name, resolve};
use crate::CoreError;
use kiln_runtime::{select_backend, select_host, BuildBackend, HostPackageManager};
use kiln_schema::{ArchiveIndex, PackageName, PackageRef, Recipe};
use kiln_store::{extract, write_index, ArchiveLayout};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Central orchestration engine for kiln.
///
/// Owns the archive layout, the configuration, and the two external
/// collaborators (host package manager and build backend), and provides
/// bootstrap, build, install, and reindex operations over them.
pub struct Engine {
    layout: ArchiveLayout,
    config: KilnConfig,
    host: Box<dyn HostPackageManager>,
    backend: Box<dyn BuildBackend>,
    initialized: bool,
}

impl Engine {
    pub fn new(
        root: impl Into<PathBuf>,
        config: KilnConfig,
        host: Box<dyn HostPackageManager>,
        backend: Box<dyn BuildBackend>,
    ) -> Self {
        Self {
            layout: ArchiveLayout::new(root),
            config,
            host,
            backend,
            initialized: false,
        }
    }

    /// Build an engine with the host and backend named in `config`.
    pub fn from_config(config: KilnConfig) -> Result<Self, CoreError> {
        let root = config.root_dir()?;
        let host = select_host(&config.host, &config.emacs)?;
        let backend = select_backend(&config.backend)?;
        Ok(Self::new(root, config, host, backend))
    }

    #[inline]
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    #[inline]
    pub fn config(&self) -> &KilnConfig {
        &self.config
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Register the archive with the host, create the local directories, and
    /// sync the recipe repository. Only the first successful call does work.
    pub fn init(&mut self) -> Result<(), CoreError> {
        if self.initialized {
            return Ok(());
        }
        info!("initializing archive at {}", self.layout.root().display());
        self.host
            .register_archive(&self.config.archive_name, &self.layout.archive_dir())?;
        self.layout.initialize()?;
        self.backend
            .sync_recipes(&self.config.recipes_remote, &self.layout.recipes_repo_dir())?;
        self.initialized = true;
        Ok(())
    }

    /// Check out and package `recipe`, returning the artifact's canonical
    /// path in the archive directory.
    pub fn build(&self, recipe: &Recipe) -> Result<PathBuf, CoreError> {
        let name = recipe.name.as_str();
        let workspace = self.layout.workspace(name);
        if let Err(e) = std::fs::remove_dir_all(&workspace) {
            debug!("workspace cleanup for {name}: {e}");
        }

        info!("building {name}");
        let version = self.backend.checkout(name, recipe, &workspace)?;
        let produced = self.backend.build_package(
            name,
            &version,
            &recipe.file_rules(),
            &workspace,
            &self.layout.archive_dir(),
        )?;

        let desc = extract(&produced).ok_or_else(|| CoreError::BuildIncomplete {
            name: name.to_owned(),
            reason: format!("no package description in {}", produced.display()),
        })?;
        debug!("built {} {} ({})", desc.name, desc.version, desc.kind);
        Ok(self.layout.artifact_path(&desc))
    }

    /// Install `package` and, first, every dependency it declares.
    ///
    /// Returns the names newly installed, dependencies before dependents.
    /// Packages the host already has are skipped without any other work.
    pub fn install(&self, package: &PackageRef) -> Result<Vec<PackageName>, CoreError> {
        let mut in_progress = Vec::new();
        let mut installed = Vec::new();
        self.install_inner(package, &mut in_progress, &mut installed)?;
        Ok(installed)
    }

    fn install_inner(
        &self,
        package: &PackageRef,
        in_progress: &mut Vec<PackageName>,
        installed: &mut Vec<PackageName>,
    ) -> Result<(), CoreError> {
        let name = package_name(package).clone();
        if self.host.is_installed(&name)? {
            debug!("{name} is already installed");
            return Ok(());
        }
        if let Some(pos) = in_progress.iter().position(|n| *n == name) {
            let mut chain: Vec<String> = in_progress[pos..].iter().map(ToString::to_string).collect();
            chain.push(name.to_string());
            return Err(CoreError::DependencyCycle(chain));
        }

        let recipe = resolve(&self.layout, package)?;
        let artifact = self.build(&recipe)?;
        let desc = extract(&artifact).ok_or_else(|| CoreError::BuildIncomplete {
            name: name.to_string(),
            reason: format!("no package description in {}", artifact.display()),
        })?;

        in_progress.push(name.clone());
        for dep in desc.package_dependencies() {
            self.install_inner(&PackageRef::Name(dep.name.clone()), in_progress, installed)?;
        }
        in_progress.pop();

        self.reindex()?;
        if let Err(e) = self.host.refresh_archive(&self.config.archive_name) {
            warn!("refreshing archive {}: {e}", self.config.archive_name);
        }
        info!("installing {name} {}", desc.version);
        self.host.install(&name)?;
        installed.push(name);
        Ok(())
    }

    /// Bootstrap, then install.
    pub fn install_or_build(&mut self, package: &PackageRef) -> Result<Vec<PackageName>, CoreError> {
        self.init()?;
        self.install(package)
    }

    /// Rescan the archive directory and rewrite its index under the archive lock.
    pub fn reindex(&self) -> Result<ArchiveIndex, CoreError> {
        let _lock = ArchiveLock::acquire(&self.layout.lock_file())?;
        Ok(write_index(&self.layout.archive_dir())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_runtime::{MockBackend, MockHost, MockPackage};
    use std::fs;

    fn engine(dir: &std::path::Path, host: &MockHost, backend: &MockBackend) -> Engine {
        Engine::new(
            dir,
            KilnConfig::default(),
            Box::new(host.clone()),
            Box::new(backend.clone()),
        )
    }

    fn add_recipe(engine: &Engine, name: &str) {
        fs::create_dir_all(engine.layout().recipes_dir()).unwrap();
        fs::write(
            engine.layout().recipe_file(name),
            format!("({name} :fetcher git :url \"mock://{name}\")"),
        )
        .unwrap();
    }

    #[test]
    fn init_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let mut engine = engine(dir.path(), &host, &MockBackend::new());

        engine.init().unwrap();
        engine.init().unwrap();
        assert!(engine.is_initialized());
        assert_eq!(host.registrations(), 1);
        assert!(engine.layout().archive_dir().is_dir());
        assert!(engine.layout().recipes_dir().is_dir());
    }

    #[test]
    fn build_returns_canonical_path_and_cleans_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().with_package("foo", MockPackage::new("1.0.0"));
        let engine = engine(dir.path(), &MockHost::new(), &backend);

        let stale = engine.layout().workspace("foo").join("stale.el");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, ";;; stale.el --- left over\n").unwrap();

        let recipe = Recipe::parse("(foo :fetcher git :url \"mock://foo\")").unwrap();
        let path = engine.build(&recipe).unwrap();
        assert_eq!(path, engine.layout().archive_dir().join("foo-1.0.0.el"));
        assert!(path.is_file());
        assert!(!stale.exists());
    }

    #[test]
    fn corrupt_build_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MockBackend::new().with_package("bad", MockPackage::default().corrupt());
        let host = MockHost::new();
        let mut engine = engine(dir.path(), &host, &backend);
        engine.init().unwrap();
        add_recipe(&engine, "bad");

        assert!(matches!(
            engine.install(&PackageRef::from("bad")),
            Err(CoreError::BuildIncomplete { name, .. }) if name == "bad"
        ));
        assert!(host.installed().is_empty());
    }

    #[test]
    fn installed_package_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::with_installed(["foo"]);
        let backend = MockBackend::new();
        let engine = engine(dir.path(), &host, &backend);

        // No recipe exists; a lookup would fail.
        let installed = engine.install(&PackageRef::from("foo")).unwrap();
        assert!(installed.is_empty());
        assert!(backend.checkouts().is_empty());
        assert!(!engine.layout().archive_dir().exists());
    }

    #[test]
    fn dependencies_install_first() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let backend = MockBackend::new()
            .with_package("a", MockPackage::new("1").requires("emacs", "25.1").requires("b", "1"))
            .with_package("b", MockPackage::new("1").requires("c", "1"))
            .with_package("c", MockPackage::new("1"));
        let mut engine = engine(dir.path(), &host, &backend);
        engine.init().unwrap();
        for name in ["a", "b", "c"] {
            add_recipe(&engine, name);
        }

        let installed = engine.install(&PackageRef::from("a")).unwrap();
        assert_eq!(installed, vec!["c", "b", "a"]);
        assert_eq!(host.installed(), vec!["c", "b", "a"]);

        let index = kiln_store::read_index(&engine.layout().archive_dir()).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn diamond_dependency_built_once() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let backend = MockBackend::new()
            .with_package("top", MockPackage::new("1").requires("left", "1").requires("right", "1"))
            .with_package("left", MockPackage::new("1").requires("base", "1"))
            .with_package("right", MockPackage::new("1").requires("base", "1"));
        let mut engine = engine(dir.path(), &host, &backend);
        engine.init().unwrap();
        for name in ["top", "left", "right", "base"] {
            add_recipe(&engine, name);
        }

        engine.install(&PackageRef::from("top")).unwrap();
        assert_eq!(
            backend.checkouts().iter().filter(|n| *n == "base").count(),
            1
        );
        assert_eq!(host.installed(), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn cycle_fails_without_installing() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let backend = MockBackend::new()
            .with_package("a", MockPackage::new("1").requires("b", "1"))
            .with_package("b", MockPackage::new("1").requires("a", "1"));
        let mut engine = engine(dir.path(), &host, &backend);
        engine.init().unwrap();
        add_recipe(&engine, "a");
        add_recipe(&engine, "b");

        match engine.install(&PackageRef::from("a")) {
            Err(CoreError::DependencyCycle(chain)) => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected a dependency cycle, got {other:?}"),
        }
        assert!(host.installed().is_empty());
    }

    #[test]
    fn missing_dependency_recipe_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let backend =
            MockBackend::new().with_package("a", MockPackage::new("1").requires("ghost", "1"));
        let mut engine = engine(dir.path(), &host, &backend);
        engine.init().unwrap();
        add_recipe(&engine, "a");

        assert!(matches!(
            engine.install(&PackageRef::from("a")),
            Err(CoreError::RecipeNotFound(n)) if n == "ghost"
        ));
        assert!(host.installed().is_empty());
    }

    #[test]
    fn literal_recipe_needs_no_repository_entry() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let mut engine = engine(dir.path(), &host, &MockBackend::new());

        let package = PackageRef::parse("(solo :fetcher git :url \"mock://solo\")").unwrap();
        let installed = engine.install_or_build(&package).unwrap();
        assert_eq!(installed, vec!["solo"]);
        assert!(engine
            .layout()
            .archive_dir()
            .join("solo-0.0.1.el")
            .is_file());
    }

    #[test]
    fn refresh_failure_does_not_abort_before_install() {
        let dir = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        // Never initialized: the archive is unregistered, so refresh fails
        // and the host then refuses the unknown package.
        let engine = engine(dir.path(), &host, &MockBackend::new());
        let package = PackageRef::parse("(solo :fetcher git :url \"mock://solo\")").unwrap();
        assert!(matches!(
            engine.install(&package),
            Err(CoreError::Runtime(kiln_runtime::RuntimeError::Host(_)))
        ));
        assert!(kiln_store::read_index(&engine.layout().archive_dir()).is_ok());
    }
}
