use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_runs(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check prerequisites for the git build backend.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_git_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_runs("git") {
        missing.push(MissingPrereq {
            name: "git".to_owned(),
            purpose: "fetching recipes and package sources",
            install_hint: "zypper install git | apt install git | dnf install git | pacman -S git",
        });
    }
    missing
}

/// Check prerequisites for the batch Emacs host, run as `emacs`.
pub fn check_emacs_prereqs(emacs: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();
    if !command_runs(emacs) {
        missing.push(MissingPrereq {
            name: emacs.to_owned(),
            purpose: "installing packages into the editor",
            install_hint:
                "zypper install emacs | apt install emacs | dnf install emacs | pacman -S emacs",
        });
    }
    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nkiln requires these tools to build and install packages.");
    msg
}
