//! Gantry Resolve - requirement graph construction and the solver seam.
//!
//! The deployer does not solve capability constraints itself. This crate:
//! - builds a [`RequirementGraph`] per reconciliation: one synthetic
//!   requirer per region carrying the union of requested feature
//!   requirements and requirements of still-installed modules
//! - applies cross-region visibility filters while collecting candidates
//! - defines the opaque [`Resolver`] trait the deployer drives
//! - ships [`GreedyResolver`], a simple highest-version-wins reference
//!   implementation that a more complete solver can replace without
//!   touching the deployer
//!
//! The output is a [`Wiring`]: requirement-to-capability edges plus the
//! concrete module chosen for every resource. Wirings are produced fresh
//! per reconciliation and never persisted.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod graph;
mod solver;
mod wiring;

pub use error::{ResolveError, ResolveResult, UnsatisfiedRequirement};
pub use graph::{GraphBuilder, RegionNode, RequirementGraph};
pub use solver::{GreedyResolver, Resolver};
pub use wiring::{ResourceId, Wire, Wiring};
