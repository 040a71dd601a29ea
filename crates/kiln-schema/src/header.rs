//! Emacs Lisp library header parsing.
//!
//! A single-file package carries its description in the comment header:
//!
//! ```text
//! ;;; foo.el --- Frobnicate things  -*- lexical-binding: t -*-
//! ;; Version: 1.2
//! ;; Package-Requires: ((emacs "25.1") (dash "2.19"))
//! ;; URL: https://example.org/foo
//! ```

use crate::descriptor::{ArtifactKind, Dependency, DescriptorError, PackageDescriptor};
use crate::sexp::{self, Sexp, SexpError};
use crate::types::PackageName;
use crate::version::Version;
use std::collections::BTreeMap;

/// Everything a library header declares. `version` is optional because
/// sources checked out from version control often omit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryHeader {
    pub name: PackageName,
    pub summary: String,
    pub version: Option<Version>,
    pub requires: Vec<Dependency>,
    pub extras: BTreeMap<String, Sexp>,
}

impl LibraryHeader {
    /// Turn the header into a descriptor, using `version` when given and the
    /// declared version otherwise.
    pub fn into_descriptor(
        self,
        kind: ArtifactKind,
        version: Option<Version>,
    ) -> Result<PackageDescriptor, DescriptorError> {
        let version = version
            .or(self.version)
            .ok_or_else(|| DescriptorError::MissingHeader(format!("{}.el: Version", self.name)))?;
        PackageDescriptor::new(
            self.name,
            version,
            self.requires,
            self.summary,
            kind,
            self.extras,
        )
    }
}

/// Parse a single-file package into its descriptor. The version header is
/// required.
pub fn parse_library(text: &str) -> Result<PackageDescriptor, DescriptorError> {
    parse_header(text)?.into_descriptor(ArtifactKind::Single, None)
}

pub fn parse_header(text: &str) -> Result<LibraryHeader, DescriptorError> {
    let mut lines = text.lines();
    let first = lines
        .next()
        .ok_or_else(|| DescriptorError::MissingHeader("empty file".to_owned()))?;
    let (name, summary) = parse_title(first)?;

    let header: Vec<&str> = lines
        .take_while(|line| !is_code_marker(line))
        .collect();
    let fields = collect_fields(&header);

    let field = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    };

    let version = match field("Package-Version").or_else(|| field("Version")) {
        Some(v) => Some(Version::parse(v)?),
        None => None,
    };

    let requires = match field("Package-Requires") {
        Some(v) => Dependency::list_from_source_form(&sexp::read(v)?)?,
        None => Vec::new(),
    };

    let mut extras = BTreeMap::new();
    if let Some(url) = field("URL").or_else(|| field("Homepage")) {
        extras.insert("url".to_owned(), Sexp::string(url));
    }
    if let Some(keywords) = field("Keywords") {
        let words: Vec<Sexp> = keywords
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|w| !w.is_empty())
            .map(Sexp::string)
            .collect();
        if !words.is_empty() {
            extras.insert("keywords".to_owned(), Sexp::List(words));
        }
    }
    let authors: Vec<Sexp> = fields
        .iter()
        .filter(|(k, _)| k.eq_ignore_ascii_case("Author"))
        .map(|(_, v)| person(v))
        .collect();
    if !authors.is_empty() {
        extras.insert("authors".to_owned(), Sexp::List(authors));
    }
    if let Some(maintainer) = field("Maintainer") {
        extras.insert("maintainer".to_owned(), person(maintainer));
    }

    Ok(LibraryHeader {
        name,
        summary,
        version,
        requires,
        extras,
    })
}

/// Return `text` with its `;; Package-Version:` header set to `version`.
///
/// An existing `Package-Version` line is replaced; otherwise the line is
/// inserted after `;; Version:` or, failing that, after the title line.
pub fn set_package_version(text: &str, version: &Version) -> String {
    let new_line = format!(";; Package-Version: {version}");
    let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
    let header_end = lines
        .iter()
        .position(|l| is_code_marker(l))
        .unwrap_or(lines.len());

    let key_of = |line: &str| field_of(line).map(|(k, _)| k.to_ascii_lowercase());

    let existing =
        (0..header_end).find(|&i| key_of(lines[i].as_str()).as_deref() == Some("package-version"));
    if let Some(idx) = existing {
        lines[idx] = new_line;
    } else {
        let after = (0..header_end)
            .find(|&i| key_of(lines[i].as_str()).as_deref() == Some("version"))
            .map_or(1.min(lines.len()), |i| i + 1);
        lines.insert(after, new_line);
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// `Name <email>` as the `(NAME . EMAIL)` cell package descriptions use.
/// Without an address the cell is `(NAME)`.
fn person(text: &str) -> Sexp {
    let text = text.trim();
    let (name, email) = match (text.find('<'), text.rfind('>')) {
        (Some(open), Some(close)) if open < close => {
            (text[..open].trim(), Some(text[open + 1..close].trim()))
        }
        _ => (text, None),
    };
    let name = if name.is_empty() { Sexp::nil() } else { Sexp::string(name) };
    match email {
        Some(email) if !email.is_empty() => Sexp::cons(name, Sexp::string(email)),
        _ => Sexp::List(vec![name]),
    }
}

fn parse_title(line: &str) -> Result<(PackageName, String), DescriptorError> {
    let rest = line
        .strip_prefix(";;;")
        .ok_or_else(|| DescriptorError::MissingHeader("first line is not ';;; NAME.el'".to_owned()))?
        .trim();
    let (file, summary) = match rest.split_once("---") {
        Some((file, summary)) => (file.trim(), summary),
        None => (rest, ""),
    };
    let name = file
        .strip_suffix(".el")
        .filter(|n| PackageName::is_valid(n))
        .ok_or_else(|| DescriptorError::MissingHeader(format!("library file name in '{line}'")))?;
    Ok((PackageName::new(name), strip_cookie(summary).trim().to_owned()))
}

/// Drop a `-*- ... -*-` file-variables cookie from the summary.
fn strip_cookie(summary: &str) -> &str {
    match summary.find("-*-") {
        Some(start) => &summary[..start],
        None => summary,
    }
}

fn is_code_marker(line: &str) -> bool {
    line.starts_with(";;; Code:")
}

fn field_of(line: &str) -> Option<(&str, &str)> {
    let body = line.strip_prefix(";;")?.trim_start_matches(';').trim();
    let (key, value) = body.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, value.trim()))
}

/// Collect `Key: value` header fields. A value that is an unfinished Lisp
/// form continues on following comment lines.
fn collect_fields(lines: &[&str]) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some((key, value)) = field_of(lines[i]) else {
            i += 1;
            continue;
        };
        let mut value = value.to_owned();
        if value.starts_with('(') {
            let mut j = i + 1;
            while matches!(sexp::read(&value), Err(SexpError::UnexpectedEof)) && j < lines.len() {
                let continuation = lines[j].trim_start_matches(';').trim();
                value.push(' ');
                value.push_str(continuation);
                j += 1;
            }
            i = j;
        } else {
            i += 1;
        }
        fields.push((key.to_owned(), value));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIBRARY: &str = "\
;;; foo.el --- Frobnicate things  -*- lexical-binding: t -*-

;; Copyright (C) 2024 Jane Doe

;; Author: Jane Doe <jane@example.org>
;; Maintainer: Jane Doe <jane@example.org>
;; Version: 1.2
;; Package-Requires: ((emacs \"25.1\") (dash \"2.19\"))
;; Keywords: tools, convenience
;; URL: https://example.org/foo

;;; Commentary:

;; Frobnicates.

;;; Code:

;; Version: 9.9

(provide 'foo)
;;; foo.el ends here
";

    #[test]
    fn parses_full_header() {
        let desc = parse_library(LIBRARY).unwrap();
        assert_eq!(desc.name, "foo");
        assert_eq!(desc.summary, "Frobnicate things");
        assert_eq!(desc.version, Version::parse("1.2").unwrap());
        assert_eq!(desc.kind, ArtifactKind::Single);
        assert_eq!(desc.dependencies.len(), 2);
        assert_eq!(desc.url(), Some("https://example.org/foo"));
        assert_eq!(
            desc.extras["keywords"].to_string(),
            "(\"tools\" \"convenience\")"
        );
        assert_eq!(
            desc.extras["authors"].to_string(),
            "((\"Jane Doe\" . \"jane@example.org\"))"
        );
        assert_eq!(
            desc.extras["maintainer"].to_string(),
            "(\"Jane Doe\" . \"jane@example.org\")"
        );
    }

    #[test]
    fn people_without_address() {
        assert_eq!(person("Jane Doe").to_string(), "(\"Jane Doe\")");
        assert_eq!(person("<j@x>").to_string(), "(nil . \"j@x\")");
        assert_eq!(person(" Jo <jo@x> ").to_string(), "(\"Jo\" . \"jo@x\")");
    }

    #[test]
    fn package_version_takes_precedence() {
        let text = LIBRARY.replace(";; Version: 1.2", ";; Version: 1.2\n;; Package-Version: 20240101.1200");
        let desc = parse_library(&text).unwrap();
        assert_eq!(desc.version, Version::parse("20240101.1200").unwrap());
    }

    #[test]
    fn multiline_requires() {
        let text = "\
;;; bar.el --- Bar
;; Version: 0.1
;; Package-Requires: ((emacs \"26.1\")
;;                    (s \"1.12\"))
;;; Code:
";
        let desc = parse_library(text).unwrap();
        assert_eq!(desc.dependencies.len(), 2);
        assert_eq!(desc.dependencies[1].name, "s");
    }

    #[test]
    fn missing_version_is_an_error() {
        let text = ";;; bar.el --- Bar\n;;; Code:\n";
        assert!(matches!(
            parse_library(text),
            Err(DescriptorError::MissingHeader(_))
        ));
        let header = parse_header(text).unwrap();
        assert!(header.version.is_none());
        let desc = header
            .into_descriptor(ArtifactKind::Multi, Some(Version::parse("3").unwrap()))
            .unwrap();
        assert_eq!(desc.kind, ArtifactKind::Multi);
    }

    #[test]
    fn missing_title_is_an_error() {
        assert!(parse_library("(defun x ())\n").is_err());
        assert!(parse_library("").is_err());
        assert!(parse_library(";;; not a library\n;; Version: 1\n").is_err());
    }

    #[test]
    fn malformed_requires_is_an_error() {
        let text = ";;; bar.el --- Bar\n;; Version: 1\n;; Package-Requires: ((dash \"2.x\"))\n";
        assert!(parse_library(text).is_err());
    }

    #[test]
    fn set_version_inserts_after_version_line() {
        let out = set_package_version(LIBRARY, &Version::parse("20240101.1200").unwrap());
        let desc = parse_library(&out).unwrap();
        assert_eq!(desc.version, Version::parse("20240101.1200").unwrap());
        assert!(out.contains(";; Version: 1.2\n;; Package-Version: 20240101.1200\n"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn set_version_replaces_existing_line() {
        let text = ";;; bar.el --- Bar\n;; Package-Version: 1\n";
        let out = set_package_version(text, &Version::parse("2").unwrap());
        assert_eq!(out, ";;; bar.el --- Bar\n;; Package-Version: 2\n");
    }

    #[test]
    fn set_version_without_version_header() {
        let text = ";;; bar.el --- Bar\n;;; Code:\n(provide 'bar)\n";
        let out = set_package_version(text, &Version::parse("0.5").unwrap());
        assert_eq!(
            out,
            ";;; bar.el --- Bar\n;; Package-Version: 0.5\n;;; Code:\n(provide 'bar)\n"
        );
    }
}
