//! Persistent deployment state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gantry_core::{FeatureId, ModuleId, RegionId};
use gantry_model::RegionFilters;

/// Everything the engine knows about the currently deployed system.
///
/// This is the value handed to `DeployCallback::persist_state` after every
/// reconciliation. It must survive a serialize/deserialize round-trip
/// byte-for-byte in meaning: the engine's idempotence guarantee depends on
/// reloaded state diffing to an empty plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Last successfully applied feature requirements, per region.
    #[serde(default)]
    pub requirements: BTreeMap<RegionId, BTreeSet<String>>,
    /// Features considered installed, per region.
    #[serde(default)]
    pub installed_features: BTreeMap<RegionId, BTreeSet<FeatureId>>,
    /// Modules this engine installed and therefore manages, per region.
    /// Modules installed outside the engine are never touched.
    #[serde(default)]
    pub managed_modules: BTreeMap<RegionId, BTreeSet<ModuleId>>,
    /// Content checksums of managed snapshot modules, for change detection.
    #[serde(default)]
    pub module_checksums: BTreeMap<ModuleId, u64>,
    /// Cross-region visibility filters in force.
    #[serde(default)]
    pub filters: RegionFilters,
    /// Whether the initial boot provisioning has completed.
    #[serde(default)]
    pub boot_done: bool,
}

impl DeploymentState {
    /// An empty state with no regions and boot not yet done.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the engine manages the given module in the given region.
    #[must_use]
    pub fn is_managed(&self, region: &RegionId, id: &ModuleId) -> bool {
        self.managed_modules
            .get(region)
            .is_some_and(|set| set.contains(id))
    }

    /// Whether the given feature is installed in the given region.
    #[must_use]
    pub fn is_feature_installed(&self, region: &RegionId, id: &FeatureId) -> bool {
        self.installed_features
            .get(region)
            .is_some_and(|set| set.contains(id))
    }

    /// Every region named by installed features or managed modules.
    #[must_use]
    pub fn regions(&self) -> BTreeSet<RegionId> {
        self.installed_features
            .keys()
            .chain(self.managed_modules.keys())
            .cloned()
            .collect()
    }

    /// Mark initial boot provisioning as finished.
    pub fn mark_boot_done(&mut self) {
        self.boot_done = true;
    }

    /// Drop empty per-region entries so equal states compare equal
    /// regardless of how they were built up.
    pub fn prune_empty(&mut self) {
        self.requirements.retain(|_, set| !set.is_empty());
        self.installed_features.retain(|_, set| !set.is_empty());
        self.managed_modules.retain(|_, set| !set.is_empty());
        let live = self.regions();
        self.filters.retain_regions(&live);
    }
}
