use crate::backend::BuildBackend;
use crate::RuntimeError;
use kiln_schema::{Fetcher, Recipe};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Builds packages from git checkouts using the `git` executable.
///
/// Versions are snapshot versions derived from the commit time of the
/// checked-out revision, in UTC, as `YYYYMMDD.HHMM`.
pub struct GitBackend {
    git: String,
}

impl Default for GitBackend {
    fn default() -> Self {
        Self {
            git: "git".to_owned(),
        }
    }
}

impl GitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(git: impl Into<String>) -> Self {
        Self { git: git.into() }
    }

    fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<String, RuntimeError> {
        let mut cmd = Command::new(&self.git);
        if let Some(dir) = cwd {
            cmd.arg("-C").arg(dir);
        }
        cmd.args(args);
        debug!("git {}", args.join(" "));

        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::BackendUnavailable(self.git.clone())
            } else {
                RuntimeError::CommandFailed(format!("{} {}: {e}", self.git, args.join(" ")))
            }
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::CommandFailed(format!(
                "{} {} exited with code {}: {}",
                self.git,
                args.join(" "),
                output.status.code().unwrap_or(1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// Snapshot version of the revision checked out in `workspace`.
    fn snapshot_version(&self, workspace: &Path) -> Result<String, RuntimeError> {
        let stamp = self.run(&["log", "-1", "--format=%ct"], Some(workspace))?;
        let secs: i64 = stamp
            .parse()
            .map_err(|_| RuntimeError::CommandFailed(format!("unexpected commit time '{stamp}'")))?;
        snapshot_version_at(secs)
    }
}

pub(crate) fn snapshot_version_at(secs: i64) -> Result<String, RuntimeError> {
    let time = chrono::DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RuntimeError::CommandFailed(format!("commit time {secs} out of range")))?;
    Ok(time.format("%Y%m%d.%H%M").to_string())
}

/// The clone URL for a recipe, expanding hosted `repo` shorthands.
pub fn clone_url(recipe: &Recipe) -> Result<String, RuntimeError> {
    let unsupported = || RuntimeError::UnsupportedFetcher {
        name: recipe.name.to_string(),
        fetcher: recipe.fetcher.as_str().to_owned(),
    };
    let missing = || RuntimeError::CommandFailed(format!("recipe '{}' has no location", recipe.name));
    match recipe.fetcher {
        Fetcher::Git => recipe.url.clone().ok_or_else(missing),
        Fetcher::Github => recipe
            .repo
            .as_ref()
            .map(|r| format!("https://github.com/{r}.git"))
            .ok_or_else(missing),
        Fetcher::Gitlab => recipe
            .repo
            .as_ref()
            .map(|r| format!("https://gitlab.com/{r}.git"))
            .ok_or_else(missing),
        Fetcher::Hg | Fetcher::Svn | Fetcher::Wiki => Err(unsupported()),
    }
}

impl BuildBackend for GitBackend {
    fn name(&self) -> &'static str {
        "git"
    }

    fn sync_recipes(&self, remote: &str, dest: &Path) -> Result<(), RuntimeError> {
        if dest.join(".git").is_dir() {
            info!("updating recipes in {}", dest.display());
            self.run(&["pull", "--ff-only", "--quiet"], Some(dest))?;
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("cloning recipes from {remote}");
        let dest_str = dest.to_string_lossy();
        self.run(&["clone", "--depth", "1", "--quiet", remote, &*dest_str], None)?;
        Ok(())
    }

    fn checkout(
        &self,
        name: &str,
        recipe: &Recipe,
        workspace: &Path,
    ) -> Result<String, RuntimeError> {
        let url = clone_url(recipe)?;
        if let Some(parent) = workspace.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let ws = workspace.to_string_lossy();

        let mut args = vec!["clone", "--quiet"];
        if recipe.commit.is_none() {
            args.extend(["--depth", "1"]);
        }
        if let Some(branch) = &recipe.branch {
            args.extend(["--branch", branch.as_str()]);
        }
        args.extend([url.as_str(), &*ws]);
        info!("fetching {name} from {url}");
        self.run(&args, None)?;

        if let Some(commit) = &recipe.commit {
            self.run(&["checkout", "--quiet", commit.as_str()], Some(workspace))?;
        }
        self.snapshot_version(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_version_is_utc_minutes() {
        // 2024-01-02T15:30:59Z
        assert_eq!(snapshot_version_at(1_704_209_459).unwrap(), "20240102.1530");
        assert_eq!(snapshot_version_at(0).unwrap(), "19700101.0000");
    }

    #[test]
    fn snapshot_version_parses_as_version() {
        let v = snapshot_version_at(1_704_209_459).unwrap();
        assert!(kiln_schema::Version::parse(&v).is_ok());
    }

    #[test]
    fn hosted_repos_expand_to_urls() {
        let gh = Recipe::parse("(foo :fetcher github :repo \"user/foo\")").unwrap();
        assert_eq!(clone_url(&gh).unwrap(), "https://github.com/user/foo.git");

        let gl = Recipe::parse("(foo :fetcher gitlab :repo \"grp/foo\")").unwrap();
        assert_eq!(clone_url(&gl).unwrap(), "https://gitlab.com/grp/foo.git");

        let git = Recipe::parse("(foo :fetcher git :url \"https://example.org/foo.git\")").unwrap();
        assert_eq!(clone_url(&git).unwrap(), "https://example.org/foo.git");
    }

    #[test]
    fn other_fetchers_are_unsupported() {
        let hg = Recipe::parse("(foo :fetcher hg :url \"https://example.org/foo\")").unwrap();
        assert!(matches!(
            clone_url(&hg),
            Err(RuntimeError::UnsupportedFetcher { .. })
        ));
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let backend = GitBackend::with_executable("/nonexistent/git-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = backend
            .sync_recipes("https://example.org/recipes.git", &dir.path().join("r"))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::BackendUnavailable(_)));
    }
}
