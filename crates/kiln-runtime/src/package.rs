//! Assembling checked-out sources into archive artifacts.
//!
//! File rules pick which sources go into the package. A package made of a
//! single library becomes `<name>-<version>.el` with its version header set;
//! anything larger becomes `<name>-<version>.tar` holding the files under
//! `<name>-<version>/` next to a generated `<name>-pkg.el`.

use crate::RuntimeError;
use kiln_schema::{
    parse_header, parse_pkg_file, pkg_file_name, render_pkg_file, set_package_version,
    ArtifactKind, FileRule, FileRules, PackageDescriptor, Version, DEFAULT_EXCLUDE_GLOBS,
    DEFAULT_FILE_GLOBS,
};
use kiln_store::artifact_file_name;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// A source file and where it lands inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Relative to the workspace.
    pub source: PathBuf,
    /// Relative to the package directory.
    pub target: PathBuf,
}

fn expand(workspace: &Path, pattern: &str) -> Result<Vec<PathBuf>, RuntimeError> {
    let base = workspace.to_str().ok_or_else(|| {
        RuntimeError::Packaging(format!("non UTF-8 workspace {}", workspace.display()))
    })?;
    let full = format!("{}/{pattern}", glob::Pattern::escape(base));
    let paths = glob::glob(&full)
        .map_err(|e| RuntimeError::Packaging(format!("bad file pattern '{pattern}': {e}")))?;

    let mut out = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| RuntimeError::Packaging(e.to_string()))?;
        if !path.is_file() {
            continue;
        }
        if let Ok(rel) = path.strip_prefix(workspace) {
            out.push(rel.to_path_buf());
        }
    }
    Ok(out)
}

fn matches_any(patterns: &[impl AsRef<str>], path: &Path) -> Result<bool, RuntimeError> {
    for p in patterns {
        let pattern = glob::Pattern::new(p.as_ref()).map_err(|e| {
            RuntimeError::Packaging(format!("bad file pattern '{}': {e}", p.as_ref()))
        })?;
        if pattern.matches_path(path) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn push_unique(selected: &mut Vec<SelectedFile>, source: PathBuf, target_dir: Option<&str>) {
    let Some(file_name) = source.file_name() else {
        return;
    };
    let target = match target_dir {
        Some(dir) => Path::new(dir.trim_end_matches('/')).join(file_name),
        None => PathBuf::from(file_name),
    };
    if selected.iter().all(|f| f.target != target) {
        selected.push(SelectedFile { source, target });
    }
}

/// Apply `rules` in order to the files under `workspace`.
///
/// Globs flatten their matches into the package root, subdirectory rules
/// place them under the named directory, and exclusions drop anything
/// selected so far. When two sources map to the same target the first wins.
pub fn select_files(workspace: &Path, rules: &FileRules) -> Result<Vec<SelectedFile>, RuntimeError> {
    let mut selected = Vec::new();
    for rule in rules.rules() {
        match rule {
            FileRule::Glob(pattern) => {
                for source in expand(workspace, pattern)? {
                    push_unique(&mut selected, source, None);
                }
            }
            FileRule::Defaults => {
                for pattern in DEFAULT_FILE_GLOBS {
                    for source in expand(workspace, pattern)? {
                        if !matches_any(DEFAULT_EXCLUDE_GLOBS, &source)? {
                            push_unique(&mut selected, source, None);
                        }
                    }
                }
            }
            FileRule::Exclude(patterns) => {
                let mut kept = Vec::with_capacity(selected.len());
                for file in selected {
                    if !matches_any(patterns.as_slice(), &file.source)? {
                        kept.push(file);
                    }
                }
                selected = kept;
            }
            FileRule::Subdir { target, globs } => {
                for pattern in globs {
                    for source in expand(workspace, pattern)? {
                        push_unique(&mut selected, source, Some(target.as_str()));
                    }
                }
            }
        }
    }
    Ok(selected)
}

fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), RuntimeError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| RuntimeError::Io(e.error))?;
    Ok(())
}

/// Package the sources in `workspace` as `name` at `version` into
/// `output_dir`, returning the artifact path.
pub fn build_package(
    name: &str,
    version: &str,
    files: &FileRules,
    workspace: &Path,
    output_dir: &Path,
) -> Result<PathBuf, RuntimeError> {
    let version = Version::parse(version)?;
    let selected = select_files(workspace, files)?;

    let main_name = format!("{name}.el");
    let main = selected
        .iter()
        .find(|f| f.target == Path::new(&main_name))
        .ok_or_else(|| {
            RuntimeError::Packaging(format!(
                "{main_name} not found in {}",
                workspace.display()
            ))
        })?;
    let main_text = fs::read_to_string(workspace.join(&main.source))?;
    let header = parse_header(&main_text)?;
    if header.name != name {
        return Err(RuntimeError::Packaging(format!(
            "{main_name} declares package '{}'",
            header.name
        )));
    }

    let pkg_name = pkg_file_name(name);
    let source_pkg = selected.iter().find(|f| f.target == Path::new(&pkg_name));
    let payload: Vec<&SelectedFile> = selected
        .iter()
        .filter(|f| f.target != Path::new(&pkg_name))
        .collect();

    fs::create_dir_all(output_dir)?;

    if payload.len() == 1 {
        let desc = header.into_descriptor(ArtifactKind::Single, Some(version.clone()))?;
        let path = artifact_file_name(output_dir, &desc);
        let text = set_package_version(&main_text, &version);
        write_atomically(output_dir, &path, text.as_bytes())?;
        debug!("packaged {name} {version} as single file");
        return Ok(path);
    }

    let desc = match source_pkg {
        Some(file) => {
            let mut desc = parse_pkg_file(&fs::read_to_string(workspace.join(&file.source))?)?;
            if desc.name != name {
                return Err(RuntimeError::Packaging(format!(
                    "{pkg_name} declares package '{}'",
                    desc.name
                )));
            }
            desc.version = version.clone();
            desc
        }
        None => header.into_descriptor(ArtifactKind::Multi, Some(version.clone()))?,
    };
    let bytes = build_tar(workspace, &desc, &payload)?;
    let path = artifact_file_name(output_dir, &desc);
    write_atomically(output_dir, &path, &bytes)?;
    debug!(
        "packaged {name} {version} as tar with {} files",
        payload.len()
    );
    Ok(path)
}

fn build_tar(
    workspace: &Path,
    desc: &PackageDescriptor,
    payload: &[&SelectedFile],
) -> Result<Vec<u8>, RuntimeError> {
    let dir = PathBuf::from(format!("{}-{}", desc.name, desc.version));
    let mut builder = tar::Builder::new(Vec::new());
    for file in payload {
        builder.append_path_with_name(workspace.join(&file.source), dir.join(&file.target))?;
    }

    let pkg = render_pkg_file(desc);
    let mut header = tar::Header::new_gnu();
    header.set_size(pkg.len() as u64);
    header.set_mode(0o644);
    builder.append_data(
        &mut header,
        dir.join(pkg_file_name(desc.name.as_str())),
        pkg.as_bytes(),
    )?;
    Ok(builder.into_inner()?)
}
