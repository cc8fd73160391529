//! Gantry Policy - pure filters applied to the module graph before
//! resolution.
//!
//! Two policies live here:
//! - [`Blacklist`]: flags features, modules, and repositories matching
//!   blacklist clauses. Flagging is a side table ([`PolicyFlags`]), not a
//!   removal, so flagged entities stay inspectable for diagnostics.
//! - [`Overrides`]: substitutes compatible replacement modules for declared
//!   ones, tagging each replacement with its selection provenance.
//!
//! Both are best-effort: a malformed clause is logged and skipped, never
//! fatal to the rest of the list.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod blacklist;
mod overrides;

pub use blacklist::{Blacklist, PolicyFlags};
pub use overrides::Overrides;
