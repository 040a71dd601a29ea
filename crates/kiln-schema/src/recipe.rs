use crate::sexp::{self, Sexp, SexpError};
use crate::types::PackageName;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to parse recipe: {0}")]
    Sexp(#[from] SexpError),
    #[error("recipe must be a list starting with the package name")]
    NotAList,
    #[error("invalid package name in recipe: '{0}'")]
    InvalidName(String),
    #[error("recipe for '{0}' has no :fetcher")]
    MissingFetcher(String),
    #[error("recipe for '{name}' uses unknown fetcher '{fetcher}'")]
    UnknownFetcher { name: String, fetcher: String },
    #[error("recipe for '{name}' requires :{key}")]
    MissingLocation { name: String, key: &'static str },
    #[error("recipe for '{name}' has an invalid :{key} value")]
    InvalidValue { name: String, key: String },
    #[error("recipe for '{name}' has an odd property list")]
    OddPropertyList { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fetcher {
    Git,
    Github,
    Gitlab,
    Hg,
    Svn,
    Wiki,
}

impl Fetcher {
    pub fn as_str(self) -> &'static str {
        match self {
            Fetcher::Git => "git",
            Fetcher::Github => "github",
            Fetcher::Gitlab => "gitlab",
            Fetcher::Hg => "hg",
            Fetcher::Svn => "svn",
            Fetcher::Wiki => "wiki",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "git" => Some(Fetcher::Git),
            "github" => Some(Fetcher::Github),
            "gitlab" => Some(Fetcher::Gitlab),
            "hg" => Some(Fetcher::Hg),
            "svn" => Some(Fetcher::Svn),
            "wiki" => Some(Fetcher::Wiki),
            _ => None,
        }
    }

    /// The property that locates the source for this fetcher, if any.
    fn location_key(self) -> Option<&'static str> {
        match self {
            Fetcher::Git | Fetcher::Hg | Fetcher::Svn => Some("url"),
            Fetcher::Github | Fetcher::Gitlab => Some("repo"),
            Fetcher::Wiki => None,
        }
    }
}

impl fmt::Display for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One element of a recipe's `:files` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRule {
    /// A glob relative to the source root.
    Glob(String),
    /// `:defaults`, the standard selection of library and documentation files.
    Defaults,
    /// `(:exclude GLOB...)`: drop matches of earlier rules.
    Exclude(Vec<String>),
    /// `("target/" GLOB...)`: place matches under a subdirectory.
    Subdir { target: String, globs: Vec<String> },
}

/// Which source files make up the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRules(pub Vec<FileRule>);

/// Globs selected by `:defaults`.
pub const DEFAULT_FILE_GLOBS: &[&str] = &[
    "*.el",
    "*.el.in",
    "dir",
    "*.info",
    "*.texi",
    "*.texinfo",
    "doc/dir",
    "doc/*.info",
    "doc/*.texi",
    "doc/*.texinfo",
];

/// Globs `:defaults` always excludes.
pub const DEFAULT_EXCLUDE_GLOBS: &[&str] = &[
    ".dir-locals.el",
    "test.el",
    "tests.el",
    "*-test.el",
    "*-tests.el",
];

impl Default for FileRules {
    fn default() -> Self {
        Self(vec![FileRule::Defaults])
    }
}

impl FileRules {
    pub fn rules(&self) -> &[FileRule] {
        &self.0
    }

    fn from_sexp(name: &str, value: &Sexp) -> Result<Self, RecipeError> {
        let invalid = || RecipeError::InvalidValue {
            name: name.to_owned(),
            key: "files".to_owned(),
        };
        let strings = |items: &[Sexp]| -> Result<Vec<String>, RecipeError> {
            items
                .iter()
                .map(|s| s.as_str().map(str::to_owned).ok_or_else(invalid))
                .collect()
        };

        let items = value.as_list().ok_or_else(invalid)?;
        let rules = items
            .iter()
            .map(|item| match item {
                Sexp::Str(glob) => Ok(FileRule::Glob(glob.clone())),
                Sexp::Symbol(s) if s == ":defaults" => Ok(FileRule::Defaults),
                Sexp::List(inner) => match inner.split_first() {
                    Some((head, rest)) if head.as_keyword() == Some("exclude") => {
                        Ok(FileRule::Exclude(strings(rest)?))
                    }
                    Some((Sexp::Str(target), rest)) if !rest.is_empty() => Ok(FileRule::Subdir {
                        target: target.clone(),
                        globs: strings(rest)?,
                    }),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(rules))
    }

    fn to_sexp(&self) -> Sexp {
        fn strings(globs: &[String]) -> impl Iterator<Item = Sexp> + '_ {
            globs.iter().map(|g| Sexp::string(g.as_str()))
        }
        Sexp::List(
            self.0
                .iter()
                .map(|rule| match rule {
                    FileRule::Glob(g) => Sexp::string(g.as_str()),
                    FileRule::Defaults => Sexp::keyword("defaults"),
                    FileRule::Exclude(globs) => Sexp::List(
                        std::iter::once(Sexp::keyword("exclude"))
                            .chain(strings(globs))
                            .collect(),
                    ),
                    FileRule::Subdir { target, globs } => Sexp::List(
                        std::iter::once(Sexp::string(target.as_str()))
                            .chain(strings(globs))
                            .collect(),
                    ),
                })
                .collect(),
        )
    }
}

/// How to fetch and assemble one package.
///
/// Written as a Lisp list: `(foo :fetcher github :repo "user/foo" :files ("*.el"))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe {
    pub name: PackageName,
    pub fetcher: Fetcher,
    pub url: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub files: Option<FileRules>,
    /// Properties this crate does not interpret, kept in source order.
    pub extras: Vec<(String, Sexp)>,
}

impl Recipe {
    pub fn parse(input: &str) -> Result<Self, RecipeError> {
        Self::from_sexp(&sexp::read(input)?)
    }

    pub fn from_sexp(value: &Sexp) -> Result<Self, RecipeError> {
        let items = value.as_list().ok_or(RecipeError::NotAList)?;
        let (head, plist) = items.split_first().ok_or(RecipeError::NotAList)?;
        let name = head.as_symbol().ok_or(RecipeError::NotAList)?;
        if !PackageName::is_valid(name) {
            return Err(RecipeError::InvalidName(name.to_owned()));
        }
        if plist.len() % 2 != 0 {
            return Err(RecipeError::OddPropertyList {
                name: name.to_owned(),
            });
        }

        let string_prop = |key: &str| -> Result<Option<String>, RecipeError> {
            match sexp::plist_get(plist, key) {
                None => Ok(None),
                Some(Sexp::Str(s)) => Ok(Some(s.clone())),
                Some(_) => Err(RecipeError::InvalidValue {
                    name: name.to_owned(),
                    key: key.to_owned(),
                }),
            }
        };

        let fetcher_name = sexp::plist_get(plist, "fetcher")
            .ok_or_else(|| RecipeError::MissingFetcher(name.to_owned()))?
            .as_name()
            .ok_or_else(|| RecipeError::InvalidValue {
                name: name.to_owned(),
                key: "fetcher".to_owned(),
            })?;
        let fetcher = Fetcher::parse(fetcher_name).ok_or_else(|| RecipeError::UnknownFetcher {
            name: name.to_owned(),
            fetcher: fetcher_name.to_owned(),
        })?;

        let url = string_prop("url")?;
        let repo = string_prop("repo")?;
        let branch = string_prop("branch")?;
        let commit = string_prop("commit")?;
        let files = sexp::plist_get(plist, "files")
            .map(|v| FileRules::from_sexp(name, v.unquote()))
            .transpose()?;

        if let Some(key) = fetcher.location_key() {
            let present = match key {
                "url" => url.is_some(),
                _ => repo.is_some(),
            };
            if !present {
                return Err(RecipeError::MissingLocation {
                    name: name.to_owned(),
                    key,
                });
            }
        }

        let extras = plist
            .chunks(2)
            .filter_map(|pair| {
                let key = pair[0].as_keyword()?;
                let known = matches!(key, "fetcher" | "url" | "repo" | "branch" | "commit" | "files");
                (!known).then(|| (key.to_owned(), pair[1].clone()))
            })
            .collect();

        Ok(Self {
            name: PackageName::new(name),
            fetcher,
            url,
            repo,
            branch,
            commit,
            files,
            extras,
        })
    }

    pub fn to_sexp(&self) -> Sexp {
        let mut items = vec![
            Sexp::symbol(self.name.as_str()),
            Sexp::keyword("fetcher"),
            Sexp::symbol(self.fetcher.as_str()),
        ];
        let mut push = |key: &str, value: Sexp| {
            items.push(Sexp::keyword(key));
            items.push(value);
        };
        for (key, value) in [
            ("url", &self.url),
            ("repo", &self.repo),
            ("branch", &self.branch),
            ("commit", &self.commit),
        ] {
            if let Some(v) = value {
                push(key, Sexp::string(v.as_str()));
            }
        }
        if let Some(files) = &self.files {
            push("files", files.to_sexp());
        }
        for (key, value) in &self.extras {
            push(key, value.clone());
        }
        Sexp::List(items)
    }

    /// The file rules in effect, falling back to `:defaults`.
    pub fn file_rules(&self) -> FileRules {
        self.files.clone().unwrap_or_default()
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sexp())
    }
}

/// What the user asked to install: a name to look up, or a literal recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRef {
    Name(PackageName),
    Literal(Recipe),
}

impl PackageRef {
    /// Parse a reference. Input starting with `(` is a recipe literal.
    pub fn parse(input: &str) -> Result<Self, RecipeError> {
        let trimmed = input.trim();
        if trimmed.starts_with('(') {
            return Ok(PackageRef::Literal(Recipe::parse(trimmed)?));
        }
        if !PackageName::is_valid(trimmed) {
            return Err(RecipeError::InvalidName(trimmed.to_owned()));
        }
        Ok(PackageRef::Name(PackageName::new(trimmed)))
    }

    /// The package this reference names.
    pub fn package_name(&self) -> &PackageName {
        match self {
            PackageRef::Name(name) => name,
            PackageRef::Literal(recipe) => &recipe.name,
        }
    }
}

impl From<Recipe> for PackageRef {
    fn from(recipe: Recipe) -> Self {
        PackageRef::Literal(recipe)
    }
}

impl From<&str> for PackageRef {
    fn from(name: &str) -> Self {
        PackageRef::Name(PackageName::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_git_recipe() {
        let r = Recipe::parse(r#"(foo :fetcher git :url "https://example/foo.git")"#).unwrap();
        assert_eq!(r.name, "foo");
        assert_eq!(r.fetcher, Fetcher::Git);
        assert_eq!(r.url.as_deref(), Some("https://example/foo.git"));
        assert!(r.files.is_none());
        assert_eq!(r.file_rules(), FileRules::default());
    }

    #[test]
    fn parses_github_recipe_with_files() {
        let r = Recipe::parse(
            r#"(magit :fetcher github :repo "magit/magit" :branch "main"
                 :files ("lisp/*.el" (:exclude "lisp/magit-libgit.el") :defaults ("etc" "etc/*.el")))"#,
        )
        .unwrap();
        assert_eq!(r.fetcher, Fetcher::Github);
        assert_eq!(r.repo.as_deref(), Some("magit/magit"));
        assert_eq!(r.branch.as_deref(), Some("main"));
        let files = r.files.unwrap();
        assert_eq!(files.rules().len(), 4);
        assert_eq!(files.rules()[0], FileRule::Glob("lisp/*.el".to_owned()));
        assert_eq!(
            files.rules()[1],
            FileRule::Exclude(vec!["lisp/magit-libgit.el".to_owned()])
        );
        assert_eq!(files.rules()[2], FileRule::Defaults);
        assert!(matches!(&files.rules()[3], FileRule::Subdir { target, .. } if target == "etc"));
    }

    #[test]
    fn keeps_unknown_properties() {
        let r = Recipe::parse(r#"(foo :fetcher wiki :old-names (bar))"#).unwrap();
        assert_eq!(r.extras.len(), 1);
        assert_eq!(r.extras[0].0, "old-names");
    }

    #[test]
    fn rejects_bad_recipes() {
        assert!(matches!(Recipe::parse("foo"), Err(RecipeError::NotAList)));
        assert!(matches!(Recipe::parse("()"), Err(RecipeError::NotAList)));
        assert!(matches!(
            Recipe::parse("(foo :url \"x\")"),
            Err(RecipeError::MissingFetcher(_))
        ));
        assert!(matches!(
            Recipe::parse("(foo :fetcher cvs)"),
            Err(RecipeError::UnknownFetcher { .. })
        ));
        assert!(matches!(
            Recipe::parse("(foo :fetcher github)"),
            Err(RecipeError::MissingLocation { key: "repo", .. })
        ));
        assert!(matches!(
            Recipe::parse("(foo :fetcher git :url 3)"),
            Err(RecipeError::InvalidValue { .. })
        ));
        assert!(matches!(
            Recipe::parse("(foo :fetcher)"),
            Err(RecipeError::OddPropertyList { .. })
        ));
        assert!(matches!(Recipe::parse("(foo"), Err(RecipeError::Sexp(_))));
    }

    #[test]
    fn printed_recipe_reparses() {
        let text = r#"(foo :fetcher gitlab :repo "u/foo" :commit "abc123" :files (:defaults "x/*.el" (:exclude "x/t.el")) :old-names (bar))"#;
        let r = Recipe::parse(text).unwrap();
        assert_eq!(Recipe::parse(&r.to_string()).unwrap(), r);
        assert_eq!(r.to_string(), text);
    }

    #[test]
    fn package_ref_forms() {
        let by_name = PackageRef::parse("dash").unwrap();
        assert_eq!(by_name, PackageRef::Name(PackageName::new("dash")));
        assert_eq!(by_name.package_name(), "dash");

        let literal = PackageRef::parse(r#" (foo :fetcher git :url "u") "#).unwrap();
        assert!(matches!(literal, PackageRef::Literal(_)));
        assert_eq!(literal.package_name(), "foo");

        assert!(PackageRef::parse("two words").is_err());
        assert!(PackageRef::parse("").is_err());
    }
}
