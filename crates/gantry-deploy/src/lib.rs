//! Gantry Deploy - the reconciliation engine.
//!
//! Callers express desired state as feature requirements per region; the
//! [`Deployer`] resolves them against a [`Catalog`], diffs the resulting
//! wiring against the persisted [`DeploymentState`], and drives the
//! [`DeployCallback`] through the minimal install/update/uninstall/
//! refresh/start plan.
//!
//! Failure semantics are first-class:
//! - missing prerequisites or artifacts abort before any mutation
//!   ([`DeployError::PartialDeployment`]); [`Deployer::deploy_fully`]
//!   installs prerequisites in earlier cycles automatically
//! - a callback failure mid-plan keeps applied steps applied and persists
//!   exactly the committed prefix - there is no rollback
//! - re-deploying a request over its own result is a no-op

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod callback;
mod catalog;
mod deployer;
mod error;
mod event;
pub mod plan;
mod request;
mod state;
mod storage;

pub use callback::{DeployCallback, ModuleHandle};
pub use catalog::Catalog;
pub use deployer::Deployer;
pub use error::{CallbackError, CallbackResult, DeployError, DeployResult};
pub use event::{
    DeployEvent, EventBus, EventMetadata, EventReceiver, FeatureEvent, FeatureEventKind,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use plan::{DeploymentPlan, ModuleInstall, ModuleUpdate, RegionPlan};
pub use request::{DeployOption, DeploymentRequest, SnapshotPolicy};
pub use state::DeploymentState;
pub use storage::StateStorage;
