//! Deployment requests: the desired state handed to the deployer.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gantry_core::{ModuleId, RangePolicy, RegionId};

/// Flags altering how a single reconciliation behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployOption {
    /// Compute and log the plan without touching the runtime or the state.
    Simulate,
    /// Narrate the plan through the callback's `print` channel.
    Verbose,
    /// Skip the refresh step after uninstalls and updates.
    NoAutoRefresh,
    /// Leave newly installed and updated modules stopped.
    NoAutoStart,
}

/// When mutable-version (snapshot) modules are re-fetched in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Never update a snapshot that is already installed.
    None,
    /// Update when the content checksum differs from the recorded one.
    #[default]
    Changed,
    /// Always update installed snapshots.
    Always,
}

/// Desired state plus the knobs governing how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Feature requirement expressions per region: `name`, `name/version`,
    /// or `name/[range)`.
    pub requirements: BTreeMap<RegionId, BTreeSet<String>>,
    /// Behavior flags for this reconciliation.
    #[serde(default)]
    pub options: BTreeSet<DeployOption>,
    /// Override clauses applied to the module graph before resolution.
    #[serde(default)]
    pub overrides: Vec<String>,
    /// Blacklist clauses applied to the graph before resolution.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// How far an installed module's version may drift from the resolved
    /// one and still be updated in place rather than replaced.
    pub module_update_range: RangePolicy,
    /// How literally a bare feature version reference is taken.
    pub feature_resolution_range: RangePolicy,
    /// Snapshot re-fetch policy.
    #[serde(default)]
    pub update_snapshots: SnapshotPolicy,
    /// Modules to leave stopped after the plan applies, per region.
    #[serde(default)]
    pub leave_stopped: BTreeMap<RegionId, BTreeSet<ModuleId>>,
}

impl DeploymentRequest {
    /// A request with no requirements and default policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given option is set.
    #[must_use]
    pub fn has_option(&self, option: DeployOption) -> bool {
        self.options.contains(&option)
    }

    /// Add a feature requirement expression to a region.
    pub fn require(&mut self, region: &RegionId, expr: impl Into<String>) {
        self.requirements
            .entry(region.clone())
            .or_default()
            .insert(expr.into());
    }
}

impl Default for DeploymentRequest {
    fn default() -> Self {
        Self {
            requirements: BTreeMap::new(),
            options: BTreeSet::new(),
            overrides: Vec::new(),
            blacklist: Vec::new(),
            module_update_range: RangePolicy::SameMinor,
            feature_resolution_range: RangePolicy::Exact,
            update_snapshots: SnapshotPolicy::Changed,
            leave_stopped: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_standard_request() {
        let request = DeploymentRequest::new();
        assert_eq!(request.module_update_range, RangePolicy::SameMinor);
        assert_eq!(request.feature_resolution_range, RangePolicy::Exact);
        assert_eq!(request.update_snapshots, SnapshotPolicy::Changed);
        assert!(request.options.is_empty());
        assert!(!request.has_option(DeployOption::Simulate));
    }

    #[test]
    fn require_accumulates_per_region() {
        let mut request = DeploymentRequest::new();
        let root = RegionId::root();
        request.require(&root, "web/1.0.0");
        request.require(&root, "metrics");
        assert_eq!(request.requirements[&root].len(), 2);
    }
}
