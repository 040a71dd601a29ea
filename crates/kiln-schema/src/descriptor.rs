use crate::sexp::{Sexp, SexpError};
use crate::types::PackageName;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("malformed Lisp data: {0}")]
    Sexp(#[from] SexpError),
    #[error("version must not be empty")]
    EmptyVersion,
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),
    #[error("invalid package name: '{0}'")]
    InvalidName(String),
    #[error("dependency '{0}' is listed more than once")]
    DuplicateDependency(String),
    #[error("missing library header: {0}")]
    MissingHeader(String),
    #[error("malformed package description: {0}")]
    Malformed(String),
}

/// Whether a package ships as one library file or as a multi-file archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Single,
    Multi,
}

impl ArtifactKind {
    /// File extension (without dot) of artifacts of this kind.
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Single => "el",
            ArtifactKind::Multi => "tar",
        }
    }

    /// Symbol the host archive format uses for this kind.
    pub fn archive_symbol(self) -> &'static str {
        match self {
            ArtifactKind::Single => "single",
            ArtifactKind::Multi => "tar",
        }
    }

    pub fn from_archive_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "single" => Some(ArtifactKind::Single),
            "tar" | "multi" => Some(ArtifactKind::Multi),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Single => f.write_str("single"),
            ArtifactKind::Multi => f.write_str("multi"),
        }
    }
}

/// A requirement on another package at or above `min_version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: PackageName,
    pub min_version: Version,
}

impl Dependency {
    pub fn new(name: impl Into<PackageName>, min_version: Version) -> Self {
        Self {
            name: name.into(),
            min_version,
        }
    }

    /// Parse a requirement list as written in library headers and
    /// `define-package` forms: `((dash "2.0") (emacs "25.1") (s))`.
    pub fn list_from_source_form(value: &Sexp) -> Result<Vec<Self>, DescriptorError> {
        let items = value
            .unquote()
            .as_list()
            .ok_or_else(|| DescriptorError::Malformed(format!("requirements: {value}")))?;
        items
            .iter()
            .map(|req| {
                let parts = req
                    .as_list()
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| DescriptorError::Malformed(format!("requirement: {req}")))?;
                let name = parts[0]
                    .as_symbol()
                    .ok_or_else(|| DescriptorError::Malformed(format!("requirement: {req}")))?;
                let version = match parts.get(1) {
                    None => Version::zero(),
                    Some(Sexp::Str(s)) => Version::parse(s)?,
                    Some(other) => Version::from_sexp(other)?,
                };
                Ok(Self::new(name, version))
            })
            .collect()
    }

    /// Render as `(dash "2.0")`, the form `define-package` expects.
    pub fn to_source_form(&self) -> Sexp {
        Sexp::List(vec![
            Sexp::symbol(self.name.as_str()),
            Sexp::string(self.min_version.to_string()),
        ])
    }

    /// Parse an index requirement: `(dash (2 0))`.
    pub fn from_index_form(value: &Sexp) -> Result<Self, DescriptorError> {
        match value.as_list() {
            Some([name, version]) => {
                let name = name
                    .as_symbol()
                    .ok_or_else(|| DescriptorError::Malformed(format!("requirement: {value}")))?;
                Ok(Self::new(name, Version::from_sexp(version)?))
            }
            _ => Err(DescriptorError::Malformed(format!("requirement: {value}"))),
        }
    }

    pub fn to_index_form(&self) -> Sexp {
        Sexp::List(vec![
            Sexp::symbol(self.name.as_str()),
            self.min_version.to_sexp(),
        ])
    }
}

/// Metadata describing one built package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: PackageName,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    pub summary: String,
    pub kind: ArtifactKind,
    /// Extra metadata keyed by keyword name without the colon (`url`,
    /// `keywords`, `authors`, `maintainer`, `commit`).
    pub extras: BTreeMap<String, Sexp>,
}

impl PackageDescriptor {
    /// Construct a descriptor, enforcing a valid name and unique dependencies.
    pub fn new(
        name: impl Into<PackageName>,
        version: Version,
        dependencies: Vec<Dependency>,
        summary: impl Into<String>,
        kind: ArtifactKind,
        extras: BTreeMap<String, Sexp>,
    ) -> Result<Self, DescriptorError> {
        let name = name.into();
        if !PackageName::is_valid(&name) {
            return Err(DescriptorError::InvalidName(name.into_inner()));
        }
        let mut seen = HashSet::new();
        for dep in &dependencies {
            if !seen.insert(dep.name.as_str()) {
                return Err(DescriptorError::DuplicateDependency(dep.name.to_string()));
            }
        }
        Ok(Self {
            name,
            version,
            dependencies,
            summary: summary.into(),
            kind,
            extras,
        })
    }

    /// Dependencies that name real packages, skipping the host runtime.
    pub fn package_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|dep| !dep.name.is_host_runtime())
    }

    pub fn url(&self) -> Option<&str> {
        self.extras.get("url").and_then(Sexp::as_str)
    }
}
