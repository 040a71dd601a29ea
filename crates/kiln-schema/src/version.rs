use crate::descriptor::DescriptorError;
use crate::sexp::Sexp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Package version: a non-empty sequence of non-negative integers, each no
/// larger than a Lisp fixnum (`i64::MAX`).
///
/// Ordering is lexicographic by component, with missing trailing components
/// treated as zero, so `1.0` and `1` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(Vec<u64>);

impl Version {
    pub fn new(components: Vec<u64>) -> Result<Self, DescriptorError> {
        if components.is_empty() {
            return Err(DescriptorError::EmptyVersion);
        }
        if let Some(n) = components.iter().find(|&&n| i64::try_from(n).is_err()) {
            return Err(DescriptorError::InvalidVersion(format!(
                "component {n} does not fit a Lisp integer"
            )));
        }
        Ok(Self(components))
    }

    /// The version every requirement without an explicit version resolves to.
    pub fn zero() -> Self {
        Self(vec![0])
    }

    /// Parse a dotted version string such as `"2.19.1"`.
    pub fn parse(input: &str) -> Result<Self, DescriptorError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DescriptorError::EmptyVersion);
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(DescriptorError::InvalidVersion(input.to_owned()));
                }
                part.parse::<u64>()
                    .map_err(|_| DescriptorError::InvalidVersion(input.to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(components)
    }

    /// Read a version written as a Lisp integer list, e.g. `(1 2 3)`.
    pub fn from_sexp(value: &Sexp) -> Result<Self, DescriptorError> {
        let items = value
            .as_list()
            .ok_or_else(|| DescriptorError::InvalidVersion(value.to_string()))?;
        let components = items
            .iter()
            .map(|item| {
                item.as_int()
                    .and_then(|n| u64::try_from(n).ok())
                    .ok_or_else(|| DescriptorError::InvalidVersion(value.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(components)
    }

    pub fn to_sexp(&self) -> Sexp {
        Sexp::List(
            self.0
                .iter()
                .map(|&n| Sexp::Int(i64::try_from(n).unwrap_or(i64::MAX)))
                .collect(),
        )
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{n}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl TryFrom<String> for Version {
    type Error = DescriptorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_versions() {
        assert_eq!(Version::parse("1.2.3").unwrap().components(), &[1, 2, 3]);
        assert_eq!(
            Version::parse("20240131.1502").unwrap().components(),
            &[20_240_131, 1502]
        );
        assert_eq!(Version::parse(" 0 ").unwrap().components(), &[0]);
    }

    #[test]
    fn rejects_malformed_versions() {
        assert!(matches!(Version::parse(""), Err(DescriptorError::EmptyVersion)));
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.0-beta").is_err());
        assert!(Version::parse("v1").is_err());
        assert!(Version::new(Vec::new()).is_err());
    }

    #[test]
    fn oversized_components_are_rejected() {
        assert!(Version::parse("9223372036854775807").is_ok());
        assert!(matches!(
            Version::parse("1.9223372036854775808"),
            Err(DescriptorError::InvalidVersion(_))
        ));
        assert!(Version::new(vec![u64::MAX]).is_err());

        let max = Version::parse("1.9223372036854775807").unwrap();
        assert_eq!(Version::from_sexp(&max.to_sexp()).unwrap(), max);
    }

    #[test]
    fn ordering_is_componentwise() {
        let v = |s| Version::parse(s).unwrap();
        assert!(v("1.10") > v("1.9"));
        assert!(v("2") > v("1.99.99"));
        assert!(v("1.0.1") > v("1"));
        assert_eq!(v("1.0"), v("1"));
        assert_eq!(v("1.0").cmp(&v("1.0.0")), Ordering::Equal);
    }

    #[test]
    fn display_joins_every_component() {
        assert_eq!(Version::parse("1.0.0").unwrap().to_string(), "1.0.0");
    }

    #[test]
    fn sexp_form() {
        let v = Version::parse("2.19.1").unwrap();
        assert_eq!(v.to_sexp().to_string(), "(2 19 1)");
        let back = Version::from_sexp(&v.to_sexp()).unwrap();
        assert_eq!(back.components(), v.components());
        assert!(Version::from_sexp(&Sexp::nil()).is_err());
        assert!(Version::from_sexp(&Sexp::List(vec![Sexp::Int(-1)])).is_err());
    }

    #[test]
    fn serde_uses_dotted_string() {
        let v = Version::parse("0.3").unwrap();
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"0.3\"");
        let back: Version = serde_json::from_str("\"0.3\"").unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<Version>("\"x\"").is_err());
    }
}
