//! Identifiers for modules, features, and isolation regions.
//!
//! Module and feature identities are `name/version` pairs; their string form
//! is used as the canonical serialized representation so they can be map
//! keys in persisted state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::{Version, VersionError};

/// The default isolation region every deployment starts with.
pub const ROOT_REGION: &str = "root";

/// Errors produced when parsing an identifier string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The string is missing the `name/version` separator.
    #[error("expected name/version, got {0}")]
    MissingSeparator(String),
    /// The name part is empty.
    #[error("empty name in identifier {0}")]
    EmptyName(String),
    /// The version part failed to parse.
    #[error("bad version in identifier: {0}")]
    BadVersion(#[from] VersionError),
}

macro_rules! versioned_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name {
            /// Symbolic name.
            pub name: String,
            /// Concrete version.
            pub version: Version,
        }

        impl $name {
            /// Build an identifier from a name and version.
            #[must_use]
            pub fn new(name: impl Into<String>, version: Version) -> Self {
                Self {
                    name: name.into(),
                    version,
                }
            }

            /// Parse the canonical `name/version` form.
            ///
            /// # Errors
            ///
            /// Returns [`IdParseError`] when the separator or version is
            /// missing or malformed.
            pub fn parse(s: &str) -> Result<Self, IdParseError> {
                let (name, version) = s
                    .split_once('/')
                    .ok_or_else(|| IdParseError::MissingSeparator(s.to_string()))?;
                if name.is_empty() {
                    return Err(IdParseError::EmptyName(s.to_string()));
                }
                Ok(Self {
                    name: name.to_string(),
                    version: Version::parse(version)?,
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}/{}", self.name, self.version)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdParseError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }
    };
}

versioned_id! {
    /// Identity of a module: symbolic name plus concrete version.
    ModuleId
}

versioned_id! {
    /// Identity of a feature: name plus concrete version.
    FeatureId
}

/// Name of an isolation region.
///
/// Regions form a flat map (no hierarchy); cross-region capability
/// visibility is governed by per-region filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    /// The root region.
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_REGION.to_string())
    }

    /// Build a region id from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The region name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
