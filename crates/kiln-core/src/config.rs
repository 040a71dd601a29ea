use crate::CoreError;
use kiln_schema::ArchiveName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_RECIPES_REMOTE: &str = "https://github.com/melpa/melpa.git";

/// User configuration, read from `~/.config/kiln/config.toml`.
///
/// Every field is optional in the file; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
    /// Directory holding the archive, build workspaces, and recipes.
    /// Defaults to `~/.emacs.d/kiln`.
    pub root: Option<PathBuf>,
    /// Name the archive is registered under with the host.
    pub archive_name: ArchiveName,
    pub recipes_remote: String,
    pub host: String,
    pub backend: String,
    /// Emacs executable for the `emacs` host.
    pub emacs: String,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            root: None,
            archive_name: ArchiveName::new("kiln"),
            recipes_remote: DEFAULT_RECIPES_REMOTE.to_owned(),
            host: "emacs".to_owned(),
            backend: "git".to_owned(),
            emacs: "emacs".to_owned(),
        }
    }
}

impl KilnConfig {
    pub fn parse(content: &str) -> Result<Self, CoreError> {
        toml::from_str(content).map_err(|e| CoreError::Config(format!("invalid config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load `~/.config/kiln/config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load_default() -> Result<Self, CoreError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn root_dir(&self) -> Result<PathBuf, CoreError> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(home_dir()?.join(".emacs.d/kiln")),
        }
    }
}

fn home_dir() -> Result<PathBuf, CoreError> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| CoreError::Config("HOME not set".to_owned()))
}

pub fn default_config_path() -> Result<PathBuf, CoreError> {
    Ok(home_dir()?.join(".config/kiln/config.toml"))
}
