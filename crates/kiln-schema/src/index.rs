//! The `archive-contents` index the host package manager reads.
//!
//! ```text
//! (1
//!  (foo . [(1 2) ((dash (2 19))) "Frobnicate things" single ((:url . "https://example.org/foo"))])
//!  (bar . [(0 3) nil "Bar" tar nil]))
//! ```

use crate::descriptor::{ArtifactKind, Dependency, DescriptorError, PackageDescriptor};
use crate::sexp::{self, Sexp};
use crate::types::PackageName;
use crate::version::Version;
use std::collections::BTreeMap;
use thiserror::Error;

/// Format version the host expects at the head of the index.
pub const ARCHIVE_FORMAT_VERSION: i64 = 1;

/// File name of the index inside the archive directory.
pub const INDEX_FILE_NAME: &str = "archive-contents";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("malformed archive index: {0}")]
    Malformed(String),
    #[error("unsupported archive format version {0}, expected 1")]
    UnsupportedVersion(i64),
    #[error("invalid archive entry: {0}")]
    Entry(#[from] DescriptorError),
}

impl From<sexp::SexpError> for IndexError {
    fn from(e: sexp::SexpError) -> Self {
        IndexError::Entry(DescriptorError::Sexp(e))
    }
}

/// One package as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: PackageName,
    pub version: Version,
    pub requires: Vec<Dependency>,
    pub summary: String,
    pub kind: ArtifactKind,
    pub extras: BTreeMap<String, Sexp>,
}

impl From<&PackageDescriptor> for ArchiveEntry {
    fn from(desc: &PackageDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            version: desc.version.clone(),
            requires: desc.dependencies.clone(),
            summary: desc.summary.clone(),
            kind: desc.kind,
            extras: desc.extras.clone(),
        }
    }
}

impl ArchiveEntry {
    /// `(name . [version requires summary kind extras])`
    pub fn to_sexp(&self) -> Sexp {
        let requires = Sexp::List(self.requires.iter().map(Dependency::to_index_form).collect());
        let extras = Sexp::List(
            self.extras
                .iter()
                .map(|(key, value)| Sexp::cons(Sexp::keyword(key), value.clone()))
                .collect(),
        );
        Sexp::cons(
            Sexp::symbol(self.name.as_str()),
            Sexp::Vector(vec![
                self.version.to_sexp(),
                requires,
                Sexp::string(self.summary.as_str()),
                Sexp::symbol(self.kind.archive_symbol()),
                extras,
            ]),
        )
    }

    pub fn from_sexp(value: &Sexp) -> Result<Self, IndexError> {
        let malformed = || IndexError::Malformed(format!("entry {value}"));
        let Sexp::Dotted(head, tail) = value else {
            return Err(malformed());
        };
        let [name] = head.as_slice() else {
            return Err(malformed());
        };
        let name = name.as_symbol().ok_or_else(malformed)?;
        let Sexp::Vector(fields) = tail.as_ref() else {
            return Err(malformed());
        };
        let [version, requires, summary, kind, rest @ ..] = fields.as_slice() else {
            return Err(malformed());
        };

        let version = Version::from_sexp(version)?;
        let requires = requires
            .as_list()
            .ok_or_else(malformed)?
            .iter()
            .map(Dependency::from_index_form)
            .collect::<Result<Vec<_>, _>>()?;
        let summary = summary.as_str().ok_or_else(malformed)?.to_owned();
        let kind = kind
            .as_symbol()
            .and_then(ArtifactKind::from_archive_symbol)
            .ok_or_else(malformed)?;

        let mut extras = BTreeMap::new();
        if let Some(alist) = rest.first() {
            for pair in alist.as_list().ok_or_else(malformed)? {
                let (key, value) = match pair {
                    Sexp::Dotted(h, t) if h.len() == 1 => (&h[0], t.as_ref().clone()),
                    Sexp::Dotted(h, t) if h.len() > 1 => {
                        (&h[0], Sexp::Dotted(h[1..].to_vec(), t.clone()))
                    }
                    Sexp::List(items) if !items.is_empty() => {
                        (&items[0], Sexp::List(items[1..].to_vec()))
                    }
                    _ => return Err(malformed()),
                };
                let key = key.as_keyword().ok_or_else(malformed)?;
                extras.insert(key.to_owned(), value);
            }
        }

        Ok(Self {
            name: PackageName::new(name),
            version,
            requires,
            summary,
            kind,
            extras,
        })
    }

    /// File name of the artifact this entry refers to.
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.kind.extension())
    }
}

/// Format version plus at most one entry per package name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveIndex {
    entries: BTreeMap<PackageName, ArchiveEntry>,
}

impl ArchiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_version(&self) -> i64 {
        ARCHIVE_FORMAT_VERSION
    }

    /// Insert an entry, replacing any existing entry with the same name.
    pub fn insert(&mut self, entry: ArchiveEntry) -> Option<ArchiveEntry> {
        self.entries.insert(entry.name.clone(), entry)
    }

    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values()
    }

    /// Print the index as the host reads it, one entry per line.
    pub fn serialize(&self) -> String {
        let mut out = format!("({ARCHIVE_FORMAT_VERSION}");
        for entry in self.entries.values() {
            out.push_str("\n ");
            out.push_str(&entry.to_sexp().to_string());
        }
        out.push_str(")\n");
        out
    }

    pub fn parse(text: &str) -> Result<Self, IndexError> {
        let value = sexp::read(text)?;
        let items = value
            .as_list()
            .ok_or_else(|| IndexError::Malformed("index is not a list".to_owned()))?;
        let (head, rest) = items
            .split_first()
            .ok_or_else(|| IndexError::Malformed("index is empty".to_owned()))?;
        let version = head
            .as_int()
            .ok_or_else(|| IndexError::Malformed(format!("format version {head}")))?;
        if version != ARCHIVE_FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(version));
        }
        let mut index = Self::new();
        for item in rest {
            index.insert(ArchiveEntry::from_sexp(item)?);
        }
        Ok(index)
    }
}

impl FromIterator<ArchiveEntry> for ArchiveIndex {
    fn from_iter<I: IntoIterator<Item = ArchiveEntry>>(iter: I) -> Self {
        let mut index = Self::new();
        for entry in iter {
            index.insert(entry);
        }
        index
    }
}
