//! Gantry Core - identifiers and version primitives for the Gantry
//! reconciliation engine.
//!
//! This crate provides:
//! - A four-segment [`Version`] with an optional qualifier, ordered the way
//!   module runtimes order artifact versions
//! - Bracket-syntax [`VersionRange`] (`[1.0,2.0)`) with containment checks
//! - [`RangePolicy`] for expanding a concrete version into an update or
//!   resolution range
//! - Newtype identifiers for modules, features, and isolation regions
//!
//! Everything here is pure data: no I/O, no async.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod id;
mod range_policy;
mod version;

pub use id::{FeatureId, IdParseError, ModuleId, RegionId, ROOT_REGION};
pub use range_policy::RangePolicy;
pub use version::{Version, VersionError, VersionRange};
