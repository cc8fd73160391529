//! The seam between the engine and the module-lifecycle runtime.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use gantry_core::{ModuleId, RegionId};
use gantry_model::{Module, RegionFilters};
use gantry_resolve::Wiring;

use crate::error::CallbackResult;
use crate::event::FeatureEvent;
use crate::state::DeploymentState;

/// Identity token for a module the runtime is holding.
///
/// The engine never sees the runtime's own objects; it addresses modules by
/// region and identity, and the callback maps those to whatever it manages.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleHandle {
    /// Region the module lives in.
    pub region: RegionId,
    /// The module's identity.
    pub id: ModuleId,
}

impl ModuleHandle {
    /// Build a handle addressing a module in a region.
    #[must_use]
    pub fn new(region: RegionId, id: ModuleId) -> Self {
        Self { region, id }
    }
}

impl fmt::Display for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.id)
    }
}

/// Operations the engine drives against the underlying runtime.
///
/// Implementations are the only place module lifecycle actually happens; the
/// engine computes plans and calls these in order. Any error aborts the
/// remaining plan without rolling back applied steps, so implementations
/// should fail only when the runtime is genuinely unable to comply.
#[async_trait]
pub trait DeployCallback: Send + Sync {
    /// Install a module into a region. Leave it stopped.
    async fn install_module(
        &self,
        region: &RegionId,
        module: &Module,
    ) -> CallbackResult<ModuleHandle>;

    /// Replace a module's content in place. Leave it stopped.
    async fn update_module(&self, handle: &ModuleHandle, module: &Module) -> CallbackResult<()>;

    /// Remove a module from the runtime.
    async fn uninstall_module(&self, handle: &ModuleHandle) -> CallbackResult<()>;

    /// Start a module.
    async fn start_module(&self, handle: &ModuleHandle) -> CallbackResult<()>;

    /// Stop a module, waiting at most `timeout` for it to wind down.
    async fn stop_module(&self, handle: &ModuleHandle, timeout: Duration) -> CallbackResult<()>;

    /// Re-wire modules whose dependencies changed. Called at most once per
    /// reconciliation, after all uninstalls and updates.
    async fn refresh_modules(&self, handles: &[ModuleHandle]) -> CallbackResult<()>;

    /// Let the runtime see the wiring the resolver chose.
    async fn resolve_modules(
        &self,
        handles: &[ModuleHandle],
        wiring: &Wiring,
    ) -> CallbackResult<()>;

    /// Install the new visibility graph: region filters plus the modules
    /// each region now contains.
    async fn replace_visibility_graph(
        &self,
        filters: &RegionFilters,
        state: &DeploymentState,
    ) -> CallbackResult<()>;

    /// Durably record the state. Called once per successful reconciliation
    /// and once more with the committed prefix when a plan aborts.
    async fn persist_state(&self, state: &DeploymentState) -> CallbackResult<()>;

    /// Deliver a feature lifecycle event to runtime listeners.
    async fn emit_feature_event(&self, event: &FeatureEvent) -> CallbackResult<()>;

    /// Surface a human-readable progress message.
    async fn print(&self, message: &str, is_error: bool);
}
