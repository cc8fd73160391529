use std::fmt;

use thiserror::Error;

use gantry_core::{FeatureId, RegionId};
use gantry_model::Requirement;

/// A mandatory requirement no visible capability could satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedRequirement {
    /// Region the requirement was raised in.
    pub region: RegionId,
    /// The requirement itself.
    pub requirement: Requirement,
}

impl fmt::Display for UnsatisfiedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.region, self.requirement)
    }
}

/// Errors produced while building the requirement graph or resolving it.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No feature in the graph matches a requested feature requirement.
    #[error("no feature matches requirement {requirement} in region {region}")]
    NoMatchingFeature {
        /// Region the feature was requested in.
        region: RegionId,
        /// The feature requirement expression.
        requirement: String,
    },
    /// The requested feature exists but is blacklisted.
    #[error("feature {feature} is blacklisted")]
    BlacklistedFeature {
        /// The blacklisted feature.
        feature: FeatureId,
    },
    /// No consistent wiring exists for the mandatory requirements listed.
    #[error("unable to resolve {} requirement(s): {}", .0.len(), display_list(.0))]
    Unsatisfied(Vec<UnsatisfiedRequirement>),
}

fn display_list(reqs: &[UnsatisfiedRequirement]) -> String {
    reqs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A specialized Result type for resolution operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
