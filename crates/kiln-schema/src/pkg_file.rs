//! The `<name>-pkg.el` member that describes a multi-file package:
//!
//! ```text
//! (define-package "foo" "1.2" "Frobnicate things"
//!   '((emacs "25.1") (dash "2.19"))
//!   :url "https://example.org/foo" :keywords '("tools"))
//! ```

use crate::descriptor::{ArtifactKind, Dependency, DescriptorError, PackageDescriptor};
use crate::sexp::{self, Sexp};
use crate::version::Version;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// File name of the descriptor member for `name`.
pub fn pkg_file_name(name: &str) -> String {
    format!("{name}-pkg.el")
}

pub fn parse_pkg_file(text: &str) -> Result<PackageDescriptor, DescriptorError> {
    let forms = sexp::read_all(text)?;
    let args = forms
        .iter()
        .find_map(|form| match form.as_list() {
            Some([head, rest @ ..]) if head.as_symbol() == Some("define-package") => Some(rest),
            _ => None,
        })
        .ok_or_else(|| DescriptorError::Malformed("no define-package form".to_owned()))?;

    let positional = |i: usize, what: &str| {
        args.get(i)
            .ok_or_else(|| DescriptorError::Malformed(format!("define-package: missing {what}")))
    };

    let name = positional(0, "name")?
        .as_name()
        .ok_or_else(|| DescriptorError::Malformed("define-package: name is not a string".to_owned()))?;
    let version = positional(1, "version")?
        .as_str()
        .ok_or_else(|| {
            DescriptorError::Malformed("define-package: version is not a string".to_owned())
        })
        .and_then(Version::parse)?;
    let summary = match args.get(2) {
        Some(Sexp::Str(s)) => s.clone(),
        Some(other) if other.is_nil() => String::new(),
        None => String::new(),
        Some(other) => {
            return Err(DescriptorError::Malformed(format!(
                "define-package: summary {other}"
            )))
        }
    };
    let requires = match args.get(3) {
        Some(value) => Dependency::list_from_source_form(value)?,
        None => Vec::new(),
    };

    let plist = args.get(4..).unwrap_or_default();
    if plist.len() % 2 != 0 {
        return Err(DescriptorError::Malformed(
            "define-package: odd property list".to_owned(),
        ));
    }
    let mut extras = BTreeMap::new();
    for pair in plist.chunks(2) {
        let key = pair[0].as_keyword().ok_or_else(|| {
            DescriptorError::Malformed(format!("define-package: property {}", pair[0]))
        })?;
        extras.insert(key.to_owned(), pair[1].unquote().clone());
    }

    PackageDescriptor::new(name, version, requires, summary, ArtifactKind::Multi, extras)
}

/// Render the `define-package` file for a multi-file package.
pub fn render_pkg_file(desc: &PackageDescriptor) -> String {
    let requires = Sexp::List(
        desc.dependencies
            .iter()
            .map(Dependency::to_source_form)
            .collect(),
    );
    let mut out = format!(
        "(define-package {} {} {}\n  {}",
        Sexp::string(desc.name.as_str()),
        Sexp::string(desc.version.to_string()),
        Sexp::string(desc.summary.as_str()),
        if requires.is_nil() {
            Sexp::nil()
        } else {
            Sexp::quote(requires)
        },
    );
    for (key, value) in &desc.extras {
        let value = match value {
            Sexp::List(items) if !items.is_empty() => Sexp::quote(value.clone()),
            Sexp::Dotted(..) | Sexp::Symbol(_) => Sexp::quote(value.clone()),
            other => other.clone(),
        };
        let _ = write!(out, "\n  {} {value}", Sexp::keyword(key));
    }
    out.push_str(")\n;; Local Variables:\n;; no-byte-compile: t\n;; End:\n");
    out
}
