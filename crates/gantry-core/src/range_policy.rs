//! Policies that widen a concrete version into a version range.
//!
//! The deployer uses two of these: the bundle-update range decides whether a
//! resolved module is "close enough" to an installed one to update it in
//! place, and the feature-resolution range decides how literally a feature
//! version reference is taken during resolution.

use serde::{Deserialize, Serialize};

use crate::version::{Version, VersionRange};

/// How a concrete version expands into a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// The version is taken literally: `[v, v]`.
    Exact,
    /// Patch may float: `[major.minor.0, major.(minor+1).0)`.
    ///
    /// This is the default update range - `2.1.0` may be updated in place to
    /// `2.1.2` but not replaced by `2.2.0`.
    SameMinor,
    /// Minor and patch may float: `[major.0.0, (major+1).0.0)`.
    SameMajor,
    /// Any version matches.
    Any,
}

impl RangePolicy {
    /// Expand `v` into the range this policy allows.
    #[must_use]
    pub fn range_for(self, v: &Version) -> VersionRange {
        match self {
            Self::Exact => VersionRange::exact(v.clone()),
            Self::SameMinor => VersionRange::between(
                Version::new(v.major, v.minor, 0),
                Version::new(v.major, v.minor + 1, 0),
                false,
                true,
            ),
            Self::SameMajor => VersionRange::between(
                Version::new(v.major, 0, 0),
                Version::new(v.major + 1, 0, 0),
                false,
                true,
            ),
            Self::Any => VersionRange::any(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_minor_allows_patch_updates_only() {
        let r = RangePolicy::SameMinor.range_for(&Version::new(2, 1, 0));
        assert!(r.contains(&Version::new(2, 1, 2)));
        assert!(!r.contains(&Version::new(2, 2, 0)));
        assert!(!r.contains(&Version::new(1, 9, 9)));
    }

    #[test]
    fn same_major_allows_minor_updates() {
        let r = RangePolicy::SameMajor.range_for(&Version::new(2, 1, 0));
        assert!(r.contains(&Version::new(2, 9, 0)));
        assert!(!r.contains(&Version::new(3, 0, 0)));
    }

    #[test]
    fn exact_is_literal() {
        let r = RangePolicy::Exact.range_for(&Version::new(1, 2, 3));
        assert!(r.contains(&Version::new(1, 2, 3)));
        assert!(!r.contains(&Version::new(1, 2, 4)));
    }
}
