//! Module versions and version ranges.
//!
//! Versions follow the `major.minor.patch[.qualifier]` convention used by
//! module descriptors. Ranges use bracket syntax (`[1.0,2.0)`), where square
//! brackets are inclusive and parentheses exclusive.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when parsing versions or version ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The version string has no segments or too many.
    #[error("invalid version format: {0}")]
    InvalidVersion(String),
    /// A numeric segment could not be parsed.
    #[error("invalid version segment in {0}")]
    InvalidSegment(String),
    /// The range string is not a valid bracket range or plain version.
    #[error("invalid version range: {0}")]
    InvalidRange(String),
}

/// A module version: `major.minor.patch` plus an optional qualifier.
///
/// Ordering is numeric on the first three segments; a version without a
/// qualifier sorts before the same version with one, and qualifiers compare
/// lexically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Version {
    /// Major segment.
    pub major: u64,
    /// Minor segment.
    pub minor: u64,
    /// Patch segment.
    pub patch: u64,
    /// Optional qualifier (e.g. `"SNAPSHOT"`).
    pub qualifier: Option<String>,
}

impl Version {
    /// Create a version without a qualifier.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: None,
        }
    }

    /// Create a version with a qualifier.
    #[must_use]
    pub fn with_qualifier(major: u64, minor: u64, patch: u64, qualifier: impl Into<String>) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: Some(qualifier.into()),
        }
    }

    /// The zero version `0.0.0`.
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    /// Parse a version string with one to four dot-separated segments.
    ///
    /// Missing numeric segments default to zero, so `"1"` parses as `1.0.0`.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidVersion`] for an empty string or more
    /// than four segments, and [`VersionError::InvalidSegment`] when a
    /// numeric segment is not a number.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionError::InvalidVersion(s.to_string()));
        }
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() > 4 {
            return Err(VersionError::InvalidVersion(s.to_string()));
        }
        let num = |idx: usize| -> Result<u64, VersionError> {
            match parts.get(idx) {
                None => Ok(0),
                Some(seg) => seg
                    .parse()
                    .map_err(|_| VersionError::InvalidSegment(s.to_string())),
            }
        };
        Ok(Self {
            major: num(0)?,
            minor: num(1)?,
            patch: num(2)?,
            qualifier: parts.get(3).map(|q| (*q).to_string()),
        })
    }

    /// Whether this version equals `other` when a trailing all-zero or empty
    /// qualifier is ignored (`1.2.3.0` matches `1.2.3`).
    #[must_use]
    pub fn matches_ignoring_zero_qualifier(&self, other: &Self) -> bool {
        fn effective(q: Option<&str>) -> Option<&str> {
            match q {
                None | Some("" | "0") => None,
                other => other,
            }
        }
        self.major == other.major
            && self.minor == other.minor
            && self.patch == other.patch
            && effective(self.qualifier.as_deref()) == effective(other.qualifier.as_deref())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(q) = &self.qualifier {
            write!(f, ".{q}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// A half-open or closed interval of versions.
///
/// Parsed from bracket syntax: `[1.0,2.0)` contains `1.0.0` up to but not
/// including `2.0.0`. A plain version string parses as the unbounded range
/// `[v, ∞)`, matching how descriptor requirements treat bare versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct VersionRange {
    /// Lower bound.
    pub floor: Version,
    /// Upper bound, or `None` for an unbounded range.
    pub ceiling: Option<Version>,
    /// Whether the lower bound is exclusive.
    pub open_floor: bool,
    /// Whether the upper bound is exclusive.
    pub open_ceiling: bool,
}

impl VersionRange {
    /// The range containing every version.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            floor: Version::zero(),
            ceiling: None,
            open_floor: false,
            open_ceiling: false,
        }
    }

    /// A range containing exactly one version.
    #[must_use]
    pub fn exact(v: Version) -> Self {
        Self {
            floor: v.clone(),
            ceiling: Some(v),
            open_floor: false,
            open_ceiling: false,
        }
    }

    /// The unbounded range `[v, ∞)`.
    #[must_use]
    pub const fn at_least(v: Version) -> Self {
        Self {
            floor: v,
            ceiling: None,
            open_floor: false,
            open_ceiling: false,
        }
    }

    /// A closed/open range with explicit bound exclusivity.
    #[must_use]
    pub const fn between(
        floor: Version,
        ceiling: Version,
        open_floor: bool,
        open_ceiling: bool,
    ) -> Self {
        Self {
            floor,
            ceiling: Some(ceiling),
            open_floor,
            open_ceiling,
        }
    }

    /// Parse a range from bracket syntax or a plain version.
    ///
    /// # Errors
    ///
    /// Returns [`VersionError::InvalidRange`] when bracket syntax is
    /// malformed, or a version parse error for bad bounds.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let s = s.trim();
        let open_floor = match s.chars().next() {
            Some('[') => false,
            Some('(') => true,
            _ => return Ok(Self::at_least(Version::parse(s)?)),
        };
        let open_ceiling = match s.chars().last() {
            Some(']') => false,
            Some(')') => true,
            _ => return Err(VersionError::InvalidRange(s.to_string())),
        };
        let inner = &s[1..s.len() - 1];
        let (lo, hi) = inner
            .split_once(',')
            .ok_or_else(|| VersionError::InvalidRange(s.to_string()))?;
        Ok(Self {
            floor: Version::parse(lo)?,
            ceiling: Some(Version::parse(hi)?),
            open_floor,
            open_ceiling,
        })
    }

    /// Whether the range contains the given version.
    #[must_use]
    pub fn contains(&self, v: &Version) -> bool {
        let above_floor = if self.open_floor {
            *v > self.floor
        } else {
            *v >= self.floor
        };
        if !above_floor {
            return false;
        }
        match &self.ceiling {
            None => true,
            Some(c) if self.open_ceiling => *v < *c,
            Some(c) => *v <= *c,
        }
    }

    /// Whether this is the exact single-version range for `v`.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.open_floor
            && !self.open_ceiling
            && self.ceiling.as_ref() == Some(&self.floor)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ceiling {
            None => write!(f, "{}", self.floor),
            Some(c) => write!(
                f,
                "{}{},{}{}",
                if self.open_floor { '(' } else { '[' },
                self.floor,
                c,
                if self.open_ceiling { ')' } else { ']' },
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<VersionRange> for String {
    fn from(r: VersionRange) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}
