//! Gantry Model - modules, features, and region visibility tables.
//!
//! This crate provides the in-memory module graph the reconciliation engine
//! works on:
//! - [`Module`] with declared capabilities and requirements, plus override
//!   provenance (effective vs. original location/version)
//! - [`Feature`] as a named, versioned bundle of module references with
//!   nested conditional sets and prerequisite features
//! - Descriptor parsing from TOML (`Module.toml`, feature repositories)
//! - [`RegionFilters`] describing cross-region capability visibility
//!
//! Model values are immutable after parsing, except for the one-shot
//! override swap performed by the policy layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod descriptor;
mod error;
mod feature;
mod module;
mod region;

pub use descriptor::{parse_feature_repository, parse_module_descriptor};
pub use error::{ModelError, ModelResult};
pub use feature::{Conditional, Feature};
pub use module::{Capability, Module, OverrideMode, Requirement};
pub use region::RegionFilters;
