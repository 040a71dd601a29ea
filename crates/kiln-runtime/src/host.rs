use crate::RuntimeError;
use std::path::Path;

/// The editor's own package manager, which installs from registered archives.
pub trait HostPackageManager: Send + Sync {
    fn name(&self) -> &str;

    fn is_installed(&self, name: &str) -> Result<bool, RuntimeError>;

    fn install(&self, name: &str) -> Result<(), RuntimeError>;

    /// Add the archive `name` served from `dir` to the host's archive list.
    fn register_archive(&self, name: &str, dir: &Path) -> Result<(), RuntimeError>;

    /// Re-read the index of a registered archive.
    fn refresh_archive(&self, name: &str) -> Result<(), RuntimeError>;
}

/// Pick a host by name. `emacs` is the executable the batch host runs.
pub fn select_host(name: &str, emacs: &str) -> Result<Box<dyn HostPackageManager>, RuntimeError> {
    match name {
        "emacs" => Ok(Box::new(crate::emacs::EmacsHost::new(emacs))),
        "mock" => Ok(Box::new(crate::mock::MockHost::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_hosts() {
        assert_eq!(select_host("emacs", "emacs").unwrap().name(), "emacs");
        assert_eq!(select_host("mock", "emacs").unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_host_fails() {
        assert!(select_host("vim", "emacs").is_err());
    }
}
