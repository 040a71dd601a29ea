//! Artifact classification, descriptor extraction, and naming.

use crate::StoreError;
use kiln_schema::{parse_library, parse_pkg_file, pkg_file_name, ArtifactKind, PackageDescriptor};
use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Classify a file by name: `.el` is a single-file package, `.tar` a
/// multi-file package, anything else is not a package.
pub fn classify(file_name: &str) -> Option<ArtifactKind> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    match ext {
        "el" => Some(ArtifactKind::Single),
        "tar" => Some(ArtifactKind::Multi),
        _ => None,
    }
}

/// `<dir>/<name>-<version>.<ext>`
pub fn artifact_file_name(archive_dir: &Path, desc: &PackageDescriptor) -> PathBuf {
    archive_dir.join(format!(
        "{}-{}.{}",
        desc.name,
        desc.version,
        desc.kind.extension()
    ))
}

/// Reads a package descriptor out of an artifact's bytes.
pub trait DescriptorFormat {
    fn parse_descriptor(
        &self,
        artifact: &Path,
        bytes: &[u8],
    ) -> Result<PackageDescriptor, StoreError>;
}

/// Descriptor lives in the library header of the single file.
#[derive(Debug, Clone, Copy)]
pub struct SingleFile;

/// Descriptor lives in `<dir>/<name>-pkg.el` inside the tar.
#[derive(Debug, Clone, Copy)]
pub struct TarArchive;

impl DescriptorFormat for SingleFile {
    fn parse_descriptor(
        &self,
        artifact: &Path,
        bytes: &[u8],
    ) -> Result<PackageDescriptor, StoreError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| StoreError::Malformed(format!("{}: {e}", artifact.display())))?;
        Ok(parse_library(text)?)
    }
}

impl DescriptorFormat for TarArchive {
    fn parse_descriptor(
        &self,
        artifact: &Path,
        bytes: &[u8],
    ) -> Result<PackageDescriptor, StoreError> {
        let mut ar = tar::Archive::new(bytes);
        for entry in ar.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let Some(package) = pkg_member_package(&path) else {
                continue;
            };
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            let desc = parse_pkg_file(&text)?;
            if desc.name != package {
                return Err(StoreError::Malformed(format!(
                    "{}: {} describes '{}'",
                    artifact.display(),
                    path.display(),
                    desc.name
                )));
            }
            return Ok(desc);
        }
        Err(StoreError::MissingMember(artifact.display().to_string()))
    }
}

/// If `path` is `<name>-<version>/<name>-pkg.el`, return `<name>`.
fn pkg_member_package(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let [dir, file] = parts.as_slice() else {
        return None;
    };
    let name = file.strip_suffix("-pkg.el")?;
    let version = dir.strip_prefix(name)?.strip_prefix('-')?;
    (!version.is_empty() && pkg_file_name(name) == *file).then(|| name.to_owned())
}

pub fn format_for(kind: ArtifactKind) -> &'static dyn DescriptorFormat {
    match kind {
        ArtifactKind::Single => &SingleFile,
        ArtifactKind::Multi => &TarArchive,
    }
}

/// Read the descriptor of the artifact at `path`, propagating every failure.
pub fn try_extract(path: &Path) -> Result<PackageDescriptor, StoreError> {
    let kind = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(classify)
        .ok_or_else(|| StoreError::NotAnArtifact(path.display().to_string()))?;
    let bytes = fs::read(path)?;
    format_for(kind).parse_descriptor(path, &bytes)
}

/// Read the descriptor of the artifact at `path`. Unreadable or malformed
/// artifacts yield `None`.
pub fn extract(path: &Path) -> Option<PackageDescriptor> {
    match try_extract(path) {
        Ok(desc) => Some(desc),
        Err(e) => {
            warn!("no descriptor for {}: {e}", path.display());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_tar;
    use kiln_schema::Version;
    use std::collections::BTreeMap;

    #[test]
    fn classify_by_extension() {
        assert_eq!(classify("foo-1.0.el"), Some(ArtifactKind::Single));
        assert_eq!(classify("foo-1.0.tar"), Some(ArtifactKind::Multi));
        assert_eq!(classify("archive-contents"), None);
        assert_eq!(classify("foo-1.0.tar.gz"), None);
        assert_eq!(classify("foo.elc"), None);
        assert_eq!(classify(".el"), None);
        assert_eq!(classify(""), None);
    }

    #[test]
    fn classify_inverts_naming() {
        for kind in [ArtifactKind::Single, ArtifactKind::Multi] {
            let desc = PackageDescriptor::new(
                "foo",
                Version::parse("1.0.0").unwrap(),
                Vec::new(),
                "desc",
                kind,
                BTreeMap::new(),
            )
            .unwrap();
            let path = artifact_file_name(Path::new("/archive"), &desc);
            let name = path.file_name().unwrap().to_str().unwrap();
            assert_eq!(classify(name), Some(kind));
        }
    }

    #[test]
    fn naming_is_deterministic() {
        let desc = PackageDescriptor::new(
            "foo",
            Version::parse("1.0.0").unwrap(),
            Vec::new(),
            "desc",
            ArtifactKind::Single,
            BTreeMap::new(),
        )
        .unwrap();
        let a = artifact_file_name(Path::new("/archive"), &desc);
        let b = artifact_file_name(Path::new("/archive"), &desc.clone());
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/archive/foo-1.0.0.el"));
    }

    #[test]
    fn extracts_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo-1.2.el");
        fs::write(
            &path,
            ";;; foo.el --- Foo\n;; Version: 1.2\n;; Package-Requires: ((dash \"2\"))\n;;; Code:\n",
        )
        .unwrap();
        let desc = extract(&path).unwrap();
        assert_eq!(desc.name, "foo");
        assert_eq!(desc.kind, ArtifactKind::Single);
        assert_eq!(desc.dependencies.len(), 1);
    }

    #[test]
    fn extracts_tar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar-0.3.tar");
        write_tar(
            &path,
            &[
                ("bar-0.3/bar.el", ";;; bar.el --- Bar\n"),
                ("bar-0.3/bar-util.el", ";;; bar-util.el --- Util\n"),
                (
                    "bar-0.3/bar-pkg.el",
                    "(define-package \"bar\" \"0.3\" \"Bar\" '((s \"1.0\")))\n",
                ),
            ],
        );
        let desc = extract(&path).unwrap();
        assert_eq!(desc.name, "bar");
        assert_eq!(desc.kind, ArtifactKind::Multi);
        assert_eq!(desc.version, Version::parse("0.3").unwrap());
    }

    #[test]
    fn tar_without_pkg_member_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bar-0.3.tar");
        write_tar(&path, &[("bar-0.3/bar.el", ";;; bar.el --- Bar\n")]);
        assert!(matches!(try_extract(&path), Err(StoreError::MissingMember(_))));
        assert!(extract(&path).is_none());
    }

    #[test]
    fn corrupt_artifacts_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let el = dir.path().join("junk-1.el");
        fs::write(&el, "(not a header)").unwrap();
        assert!(extract(&el).is_none());

        let tar = dir.path().join("junk-1.tar");
        fs::write(&tar, b"definitely not a tar archive").unwrap();
        assert!(extract(&tar).is_none());

        let binary = dir.path().join("bin-1.el");
        fs::write(&binary, [0xff, 0xfe, 0x00]).unwrap();
        assert!(extract(&binary).is_none());

        assert!(extract(&dir.path().join("missing-1.el")).is_none());
        assert!(matches!(
            try_extract(&dir.path().join("notes.txt")),
            Err(StoreError::NotAnArtifact(_))
        ));
    }

    #[test]
    fn pkg_member_detection() {
        assert_eq!(
            pkg_member_package(Path::new("foo-1.0/foo-pkg.el")).as_deref(),
            Some("foo")
        );
        assert_eq!(
            pkg_member_package(Path::new("foo-bar-2/foo-bar-pkg.el")).as_deref(),
            Some("foo-bar")
        );
        assert_eq!(pkg_member_package(Path::new("foo-1.0/other-pkg.el")), None);
        assert_eq!(pkg_member_package(Path::new("foo-pkg.el")), None);
        assert_eq!(pkg_member_package(Path::new("foo-1.0/sub/foo-pkg.el")), None);
    }
}
