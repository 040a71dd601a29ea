use crate::host::HostPackageManager;
use crate::RuntimeError;
use kiln_schema::Sexp;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::{debug, info};

/// Drives the editor's package manager through `emacs --batch --eval`.
///
/// Each operation is a separate batch process. Archives registered with
/// [`register_archive`](HostPackageManager::register_archive) are kept in
/// memory and added to `package-archives` before every evaluation.
pub struct EmacsHost {
    emacs: String,
    archives: Mutex<Vec<(String, PathBuf)>>,
}

impl EmacsHost {
    pub fn new(emacs: impl Into<String>) -> Self {
        Self {
            emacs: emacs.into(),
            archives: Mutex::new(Vec::new()),
        }
    }

    /// Wrap `form` so it runs with the package system initialized over the
    /// registered archives.
    pub fn program(&self, form: &str) -> Result<String, RuntimeError> {
        let archives = self
            .archives
            .lock()
            .map_err(|e| RuntimeError::Host(format!("mutex poisoned: {e}")))?;
        let mut program = String::from("(progn (require 'package)");
        for (name, dir) in archives.iter() {
            let mut location = dir.to_string_lossy().into_owned();
            if !location.ends_with('/') {
                location.push('/');
            }
            let entry = Sexp::cons(Sexp::string(name.as_str()), Sexp::string(location));
            program.push_str(&format!(" (add-to-list 'package-archives {})", Sexp::quote(entry)));
        }
        program.push_str(" (package-initialize) ");
        program.push_str(form);
        program.push(')');
        Ok(program)
    }

    /// Form that refreshes the contents of archive `name` and no other.
    pub fn refresh_form(name: &str) -> String {
        format!(
            "(let ((package-archives (list (assoc {} package-archives)))) (package-refresh-contents))",
            Sexp::string(name)
        )
    }

    fn eval(&self, form: &str) -> Result<String, RuntimeError> {
        let program = self.program(form)?;
        debug!("{} --batch --eval {program}", self.emacs);
        let output = Command::new(&self.emacs)
            .args(["--batch", "--eval", &program])
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::BackendUnavailable(self.emacs.clone())
                } else {
                    RuntimeError::Host(format!("{} failed to start: {e}", self.emacs))
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Host(format!(
                "{} exited with code {}: {}",
                self.emacs,
                output.status.code().unwrap_or(1),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

impl HostPackageManager for EmacsHost {
    fn name(&self) -> &'static str {
        "emacs"
    }

    fn is_installed(&self, name: &str) -> Result<bool, RuntimeError> {
        let form = format!(
            "(princ (if (package-installed-p {}) \"t\" \"nil\"))",
            Sexp::quote(Sexp::symbol(name))
        );
        Ok(self.eval(&form)? == "t")
    }

    fn install(&self, name: &str) -> Result<(), RuntimeError> {
        info!("installing {name}");
        let form = format!("(package-install {})", Sexp::quote(Sexp::symbol(name)));
        self.eval(&form)?;
        Ok(())
    }

    fn register_archive(&self, name: &str, dir: &Path) -> Result<(), RuntimeError> {
        let mut archives = self
            .archives
            .lock()
            .map_err(|e| RuntimeError::Host(format!("mutex poisoned: {e}")))?;
        archives.retain(|(n, _)| n != name);
        archives.push((name.to_owned(), dir.to_path_buf()));
        debug!("registered archive {name} at {}", dir.display());
        Ok(())
    }

    fn refresh_archive(&self, name: &str) -> Result<(), RuntimeError> {
        let known = self
            .archives
            .lock()
            .map_err(|e| RuntimeError::Host(format!("mutex poisoned: {e}")))?
            .iter()
            .any(|(n, _)| n == name);
        if !known {
            return Err(RuntimeError::Host(format!("archive '{name}' is not registered")));
        }
        self.eval(&Self::refresh_form(name))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_includes_registered_archives() {
        let host = EmacsHost::new("emacs");
        host.register_archive("kiln", Path::new("/srv/kiln/packages"))
            .unwrap();
        let program = host.program("(package-install 'foo)").unwrap();
        assert_eq!(
            program,
            "(progn (require 'package) (add-to-list 'package-archives '(\"kiln\" . \"/srv/kiln/packages/\")) (package-initialize) (package-install 'foo))"
        );
    }

    #[test]
    fn reregistering_replaces_location() {
        let host = EmacsHost::new("emacs");
        host.register_archive("kiln", Path::new("/a")).unwrap();
        host.register_archive("kiln", Path::new("/b/")).unwrap();
        let program = host.program("nil").unwrap();
        assert!(!program.contains("\"/a/\""));
        assert_eq!(program.matches("package-archives").count(), 1);
        assert!(program.contains("\"/b/\""));
    }

    #[test]
    fn refresh_is_limited_to_named_archive() {
        let host = EmacsHost::new("emacs");
        host.register_archive("kiln", Path::new("/srv/kiln/packages"))
            .unwrap();
        let program = host.program(&EmacsHost::refresh_form("kiln")).unwrap();
        assert!(program.ends_with(
            "(package-initialize) (let ((package-archives (list (assoc \"kiln\" package-archives)))) (package-refresh-contents)))"
        ));
    }

    #[test]
    fn refresh_unknown_archive_fails() {
        let host = EmacsHost::new("emacs");
        assert!(matches!(
            host.refresh_archive("kiln"),
            Err(RuntimeError::Host(_))
        ));
    }

    #[test]
    fn missing_executable_is_unavailable() {
        let host = EmacsHost::new("/nonexistent/emacs-binary");
        assert!(matches!(
            host.is_installed("foo"),
            Err(RuntimeError::BackendUnavailable(_))
        ));
    }
}
