//! Error types for the deployment engine.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use gantry_core::RegionId;
use gantry_resolve::ResolveError;

/// Errors surfaced by [`crate::DeployCallback`] implementations.
///
/// The runtime behind the callback is opaque to the engine, so its failures
/// are carried as boxed errors rather than a closed enum.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for callback operations.
pub type CallbackResult<T> = Result<T, CallbackError>;

/// Errors produced while reconciling a deployment request.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The resolver could not produce a consistent wiring.
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    /// The deployment cannot proceed yet: prerequisite features or module
    /// artifacts are missing. Nothing was mutated; deploy the missing
    /// entries first and retry.
    #[error("partial deployment, missing: {}", format_missing(.missing))]
    PartialDeployment {
        /// Missing feature expressions or artifact locations, per region.
        missing: BTreeMap<RegionId, BTreeSet<String>>,
    },

    /// Repeated prerequisite deployments never converged.
    #[error("prerequisite loop, still missing: {}", format_missing(.missing))]
    PrerequisiteLoop {
        /// The missing set that stopped shrinking.
        missing: BTreeMap<RegionId, BTreeSet<String>>,
    },

    /// A callback operation failed mid-plan. Applied steps are not rolled
    /// back; the persisted state reflects exactly what executed.
    #[error("callback failed during {step}: {source}")]
    Callback {
        /// The plan step that failed.
        step: String,
        /// The underlying runtime error.
        source: CallbackError,
    },

    /// Reading or writing the state file failed.
    #[error("state storage i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted state could not be encoded or decoded.
    #[error("state serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for deployment operations.
pub type DeployResult<T> = Result<T, DeployError>;

fn format_missing(missing: &BTreeMap<RegionId, BTreeSet<String>>) -> String {
    missing
        .iter()
        .map(|(region, entries)| {
            let list = entries.iter().cloned().collect::<Vec<_>>().join(", ");
            format!("[{region}] {list}")
        })
        .collect::<Vec<_>>()
        .join("; ")
}
