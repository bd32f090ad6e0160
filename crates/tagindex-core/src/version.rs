//! Semantic version parsing and arithmetic.
//!
//! Versions are `MAJOR.MINOR.PATCH` with an optional `-pre`/`+build` tail.
//! The tail is kept verbatim and compared as a plain string, so
//! `1.0.0-rc10 < 1.0.0-rc2`. Callers rely on that ordering matching the
//! registry tooling, not on semver precedence rules.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TagIndexError};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)([-+].*)?$").expect("version pattern is valid")
    })
}

/// Parsed version. Field order gives the total order:
/// `(major, minor, patch)` numerically, then `tail` as a string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Semver {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Pre-release/build suffix including its leading `-` or `+`; empty when absent.
    pub tail: String,
}

impl Semver {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            tail: String::new(),
        }
    }

    /// Strict parse; fails with [`TagIndexError::MalformedVersion`].
    pub fn parse(input: &str) -> Result<Self> {
        Self::parse_tolerant(input).ok_or_else(|| TagIndexError::MalformedVersion {
            input: input.to_string(),
        })
    }

    /// Parse, returning `None` for anything that is not a dotted triple.
    pub fn parse_tolerant(input: &str) -> Option<Self> {
        let caps = version_pattern().captures(input)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
            tail: caps
                .get(4)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }

    /// The following patch release. Major and minor are kept; the tail is dropped.
    pub fn next_patch(&self) -> Self {
        Self::new(self.major, self.minor, self.patch + 1)
    }

    pub fn is_prerelease(&self) -> bool {
        !self.tail.is_empty()
    }
}

/// Three-way comparison; equivalent to `a.cmp(b)`.
pub fn compare(a: &Semver, b: &Semver) -> Ordering {
    a.cmp(b)
}

/// Highest parseable version in `versions`. Unparseable entries are ignored.
pub fn max_of<I, S>(versions: I) -> Result<Semver>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    versions
        .into_iter()
        .filter_map(|v| Semver::parse_tolerant(v.as_ref()))
        .max()
        .ok_or(TagIndexError::EmptyVersionSet)
}

impl fmt::Display for Semver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}{}", self.major, self.minor, self.patch, self.tail)
    }
}

impl FromStr for Semver {
    type Err = TagIndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Semver {
    type Error = TagIndexError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Semver> for String {
    fn from(v: Semver) -> Self {
        v.to_string()
    }
}
