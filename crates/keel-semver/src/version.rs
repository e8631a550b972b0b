//! Semantic version values with a total order.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Error raised when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("version `{0}` does not have the form MAJOR.MINOR.PATCH")]
    MalformedCore(String),

    #[error("invalid numeric component `{0}`")]
    InvalidNumber(String),

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),
}

/// One dot-separated prerelease identifier.
///
/// Numeric identifiers compare by value and sort before alphanumeric ones,
/// which compare by ASCII order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identifier {
    Numeric(u64),
    AlphaNumeric(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

/// A semantic version.
///
/// Ordering follows semver precedence (numeric core, then prerelease, with
/// a release sorting above its prereleases) and breaks remaining ties on
/// build metadata so the order is total and consistent with equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Prerelease identifiers, e.g. `alpha.1`. Empty for a release.
    pub pre: Vec<Identifier>,
    /// Build metadata, e.g. `build.5`. Does not affect precedence between
    /// distinct releases, only the final tie break.
    pub build: Vec<String>,
}

impl Version {
    /// Create a release version with no prerelease or build metadata.
    pub fn new(major: u64, minor: u64, patch: u64) -> Version {
        Version {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Whether this version carries prerelease identifiers.
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Version) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A release sorts above its own prereleases.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Version) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (i, id) in self.pre.iter().enumerate() {
            f.write_str(if i == 0 { "-" } else { "." })?;
            write!(f, "{id}")?;
        }
        for (i, meta) in self.build.iter().enumerate() {
            f.write_str(if i == 0 { "+" } else { "." })?;
            f.write_str(meta)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Version, VersionError> {
        let (rest, build) = match s.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (s, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let mut numbers = core.split('.');
        let major = parse_number(numbers.next(), s)?;
        let minor = parse_number(numbers.next(), s)?;
        let patch = parse_number(numbers.next(), s)?;
        if numbers.next().is_some() {
            return Err(VersionError::MalformedCore(s.to_string()));
        }

        let pre = match pre {
            Some(pre) => pre
                .split('.')
                .map(parse_identifier)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        let build = match build {
            Some(build) => build
                .split('.')
                .map(|part| {
                    if part.is_empty() || !part.bytes().all(is_identifier_byte) {
                        Err(VersionError::InvalidIdentifier(part.to_string()))
                    } else {
                        Ok(part.to_string())
                    }
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Version {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

fn parse_number(part: Option<&str>, whole: &str) -> Result<u64, VersionError> {
    let part = part.ok_or_else(|| VersionError::MalformedCore(whole.to_string()))?;
    if part.is_empty() || (part.len() > 1 && part.starts_with('0')) {
        return Err(VersionError::InvalidNumber(part.to_string()));
    }
    part.parse()
        .map_err(|_| VersionError::InvalidNumber(part.to_string()))
}

fn parse_identifier(part: &str) -> Result<Identifier, VersionError> {
    if part.is_empty() || !part.bytes().all(is_identifier_byte) {
        return Err(VersionError::InvalidIdentifier(part.to_string()));
    }
    if part.bytes().all(|b| b.is_ascii_digit()) {
        if part.len() > 1 && part.starts_with('0') {
            return Err(VersionError::InvalidIdentifier(part.to_string()));
        }
        part.parse()
            .map(Identifier::Numeric)
            .map_err(|_| VersionError::InvalidIdentifier(part.to_string()))
    } else {
        Ok(Identifier::AlphaNumeric(part.to_string()))
    }
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

// Versions serialize as their display string so they stay readable in lock
// files and diagnostics.
impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Version, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
