//! Plan computation: diffing resolved wirings against deployed state.
//!
//! Plans are pure values. Nothing here touches the runtime; the deployer
//! applies a plan through the callback afterwards.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use gantry_core::{FeatureId, ModuleId, RegionId};
use gantry_model::Module;
use gantry_resolve::Wiring;

use crate::request::{DeploymentRequest, SnapshotPolicy};
use crate::state::DeploymentState;

/// A module to install into a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstall {
    /// The module's identity.
    pub id: ModuleId,
    /// Where its content comes from.
    pub location: String,
}

/// An in-place module update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleUpdate {
    /// The identity currently installed.
    pub from: ModuleId,
    /// The identity after the update.
    pub to: ModuleId,
    /// Where the new content comes from.
    pub location: String,
}

/// Everything that has to happen in one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionPlan {
    /// Managed modules no longer referenced by any required feature.
    pub to_uninstall: Vec<ModuleId>,
    /// Modules close enough to their resolved replacement to update in
    /// place, plus snapshots the snapshot policy wants re-fetched.
    pub to_update: Vec<ModuleUpdate>,
    /// Resolved modules not yet present.
    pub to_install: Vec<ModuleInstall>,
}

impl RegionPlan {
    /// Whether this region needs no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_uninstall.is_empty() && self.to_update.is_empty() && self.to_install.is_empty()
    }
}

/// The full diff between a wiring and the deployed state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// Per-region module work, in region order.
    pub regions: BTreeMap<RegionId, RegionPlan>,
    /// Features newly installed, per region.
    pub features_added: BTreeMap<RegionId, BTreeSet<FeatureId>>,
    /// Features no longer installed, per region.
    pub features_removed: BTreeMap<RegionId, BTreeSet<FeatureId>>,
}

impl DeploymentPlan {
    /// Whether applying this plan would change anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.values().all(RegionPlan::is_empty)
            && self.features_added.values().all(BTreeSet::is_empty)
            && self.features_removed.values().all(BTreeSet::is_empty)
    }

    /// One-line-per-action rendering for simulate/verbose output.
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        for (region, plan) in &self.regions {
            for id in &plan.to_uninstall {
                lines.push(format!("[{region}] uninstall {id}"));
            }
            for update in &plan.to_update {
                lines.push(format!("[{region}] update {} -> {}", update.from, update.to));
            }
            for install in &plan.to_install {
                lines.push(format!("[{region}] install {} from {}", install.id, install.location));
            }
        }
        if lines.is_empty() {
            "nothing to do".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Diff the resolved wiring against the deployed state.
///
/// Per region and symbolic name: a managed module whose resolved
/// counterpart has a different version is updated in place when that
/// version falls within the request's update range, otherwise it is
/// replaced. Managed snapshots with unchanged identity are re-fetched
/// according to the snapshot policy. Unmanaged modules are never touched.
#[must_use]
pub fn compute(
    state: &DeploymentState,
    wiring: &Wiring,
    modules: &BTreeMap<String, Module>,
    request: &DeploymentRequest,
) -> DeploymentPlan {
    let mut plan = DeploymentPlan::default();

    let empty_desired = BTreeMap::new();
    let empty_managed = BTreeSet::new();
    let regions: BTreeSet<&RegionId> = state
        .managed_modules
        .keys()
        .chain(wiring.modules_per_region.keys())
        .collect();

    for region in regions {
        let managed = state.managed_modules.get(region).unwrap_or(&empty_managed);
        let desired = wiring
            .modules_per_region
            .get(region)
            .unwrap_or(&empty_desired);

        let mut region_plan = RegionPlan::default();
        let mut consumed: BTreeSet<&ModuleId> = BTreeSet::new();

        for installed in managed {
            if let Some(location) = desired.get(installed) {
                consumed.insert(installed);
                if let Some(update) =
                    snapshot_update(installed, location, modules, state, request.update_snapshots)
                {
                    region_plan.to_update.push(update);
                }
                continue;
            }
            // Same name at another version: update in place when the
            // resolved version is close enough, replace otherwise.
            let update_range = request.module_update_range.range_for(&installed.version);
            let replacement = desired
                .iter()
                .filter(|(id, _)| {
                    id.name == installed.name
                        && !consumed.contains(*id)
                        && update_range.contains(&id.version)
                })
                .last();
            match replacement {
                Some((id, location)) => {
                    consumed.insert(id);
                    region_plan.to_update.push(ModuleUpdate {
                        from: installed.clone(),
                        to: id.clone(),
                        location: location.clone(),
                    });
                },
                None => region_plan.to_uninstall.push(installed.clone()),
            }
        }

        for (id, location) in desired {
            if !managed.contains(id) && !consumed.contains(id) {
                region_plan.to_install.push(ModuleInstall {
                    id: id.clone(),
                    location: location.clone(),
                });
            }
        }

        if !region_plan.is_empty() {
            debug!(
                region = %region,
                uninstall = region_plan.to_uninstall.len(),
                update = region_plan.to_update.len(),
                install = region_plan.to_install.len(),
                "Computed region plan"
            );
        }
        plan.regions.insert(region.clone(), region_plan);
    }

    diff_features(state, wiring, &mut plan);
    plan
}

/// Whether a managed module with unchanged identity still needs an update
/// because it is a snapshot whose content moved.
fn snapshot_update(
    id: &ModuleId,
    location: &str,
    modules: &BTreeMap<String, Module>,
    state: &DeploymentState,
    policy: SnapshotPolicy,
) -> Option<ModuleUpdate> {
    let module = modules.get(location)?;
    if !module.snapshot {
        return None;
    }
    let update = ModuleUpdate {
        from: id.clone(),
        to: id.clone(),
        location: location.to_string(),
    };
    match policy {
        SnapshotPolicy::None => None,
        SnapshotPolicy::Always => Some(update),
        SnapshotPolicy::Changed => {
            let recorded = state.module_checksums.get(id);
            match (module.checksum, recorded) {
                (Some(current), Some(previous)) if current != *previous => Some(update),
                (Some(_), None) => Some(update),
                _ => None,
            }
        },
    }
}

fn diff_features(state: &DeploymentState, wiring: &Wiring, plan: &mut DeploymentPlan) {
    let empty = BTreeSet::new();
    let regions: BTreeSet<&RegionId> = state
        .installed_features
        .keys()
        .chain(wiring.features_per_region.keys())
        .collect();
    for region in regions {
        let before = state.installed_features.get(region).unwrap_or(&empty);
        let after = wiring.features_per_region.get(region).unwrap_or(&empty);
        let added: BTreeSet<FeatureId> = after.difference(before).cloned().collect();
        let removed: BTreeSet<FeatureId> = before.difference(after).cloned().collect();
        if !added.is_empty() {
            plan.features_added.insert(region.clone(), added);
        }
        if !removed.is_empty() {
            plan.features_removed.insert(region.clone(), removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use gantry_core::Version;

    use super::*;

    fn wiring_with(modules: &[(&str, &str)]) -> Wiring {
        let mut wiring = Wiring::default();
        let entry = wiring
            .modules_per_region
            .entry(RegionId::root())
            .or_default();
        for (name, version) in modules {
            let id = ModuleId::new(*name, Version::parse(version).unwrap());
            entry.insert(id, format!("mvn:example/{name}/{version}"));
        }
        wiring
    }

    fn state_with(modules: &[(&str, &str)]) -> DeploymentState {
        let mut state = DeploymentState::new();
        let entry = state
            .managed_modules
            .entry(RegionId::root())
            .or_default();
        for (name, version) in modules {
            entry.insert(ModuleId::new(*name, Version::parse(version).unwrap()));
        }
        state
    }

    fn module_graph(modules: &[(&str, &str, bool, Option<u64>)]) -> BTreeMap<String, Module> {
        let mut graph = BTreeMap::new();
        for (name, version, snapshot, checksum) in modules {
            let location = format!("mvn:example/{name}/{version}");
            let mut m = Module::new(
                ModuleId::new(*name, Version::parse(version).unwrap()),
                location.clone(),
            );
            m.snapshot = *snapshot;
            m.checksum = *checksum;
            graph.insert(location, m);
        }
        graph
    }

    #[test]
    fn identical_state_yields_empty_plan() {
        let state = state_with(&[("http", "1.0.0")]);
        let wiring = wiring_with(&[("http", "1.0.0")]);
        let modules = module_graph(&[("http", "1.0.0", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn new_module_is_installed() {
        let state = DeploymentState::new();
        let wiring = wiring_with(&[("http", "1.0.0")]);
        let modules = module_graph(&[("http", "1.0.0", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        let region = &plan.regions[&RegionId::root()];
        assert_eq!(region.to_install.len(), 1);
        assert_eq!(region.to_install[0].location, "mvn:example/http/1.0.0");
    }

    #[test]
    fn dropped_module_is_uninstalled() {
        let state = state_with(&[("http", "1.0.0")]);
        let wiring = Wiring::default();
        let modules = module_graph(&[("http", "1.0.0", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        let region = &plan.regions[&RegionId::root()];
        assert_eq!(region.to_uninstall.len(), 1);
        assert!(region.to_install.is_empty());
    }

    #[test]
    fn close_version_updates_in_place() {
        let state = state_with(&[("http", "1.0.0")]);
        let wiring = wiring_with(&[("http", "1.0.3")]);
        let modules = module_graph(&[("http", "1.0.3", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        let region = &plan.regions[&RegionId::root()];
        assert_eq!(region.to_update.len(), 1);
        assert_eq!(region.to_update[0].to.version, Version::new(1, 0, 3));
        assert!(region.to_uninstall.is_empty());
        assert!(region.to_install.is_empty());
    }

    #[test]
    fn far_version_replaces() {
        let state = state_with(&[("http", "1.0.0")]);
        let wiring = wiring_with(&[("http", "2.0.0")]);
        let modules = module_graph(&[("http", "2.0.0", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        let region = &plan.regions[&RegionId::root()];
        assert_eq!(region.to_uninstall.len(), 1);
        assert_eq!(region.to_install.len(), 1);
        assert!(region.to_update.is_empty());
    }

    #[test]
    fn snapshot_updates_when_checksum_changes() {
        let mut state = state_with(&[("dev", "1.0.0")]);
        state
            .module_checksums
            .insert(ModuleId::new("dev", Version::new(1, 0, 0)), 1);
        let wiring = wiring_with(&[("dev", "1.0.0")]);
        let modules = module_graph(&[("dev", "1.0.0", true, Some(2))]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        assert_eq!(plan.regions[&RegionId::root()].to_update.len(), 1);

        // Same checksum: nothing to do.
        let same = module_graph(&[("dev", "1.0.0", true, Some(1))]);
        let plan = compute(&state, &wiring, &same, &DeploymentRequest::new());
        assert!(plan.is_empty());
    }

    #[test]
    fn snapshot_policy_none_and_always() {
        let mut state = state_with(&[("dev", "1.0.0")]);
        state
            .module_checksums
            .insert(ModuleId::new("dev", Version::new(1, 0, 0)), 1);
        let wiring = wiring_with(&[("dev", "1.0.0")]);
        let modules = module_graph(&[("dev", "1.0.0", true, Some(1))]);

        let mut request = DeploymentRequest::new();
        request.update_snapshots = SnapshotPolicy::Always;
        let plan = compute(&state, &wiring, &modules, &request);
        assert_eq!(plan.regions[&RegionId::root()].to_update.len(), 1);

        request.update_snapshots = SnapshotPolicy::None;
        let changed = module_graph(&[("dev", "1.0.0", true, Some(2))]);
        let plan = compute(&state, &wiring, &changed, &request);
        assert!(plan.is_empty());
    }

    #[test]
    fn feature_diff_tracks_additions_and_removals() {
        let mut state = DeploymentState::new();
        state
            .installed_features
            .entry(RegionId::root())
            .or_default()
            .insert(FeatureId::new("old", Version::new(1, 0, 0)));

        let mut wiring = Wiring::default();
        wiring
            .features_per_region
            .entry(RegionId::root())
            .or_default()
            .insert(FeatureId::new("new", Version::new(1, 0, 0)));

        let plan = compute(&state, &wiring, &BTreeMap::new(), &DeploymentRequest::new());
        assert!(plan.features_added[&RegionId::root()]
            .contains(&FeatureId::new("new", Version::new(1, 0, 0))));
        assert!(plan.features_removed[&RegionId::root()]
            .contains(&FeatureId::new("old", Version::new(1, 0, 0))));
    }

    #[test]
    fn render_lists_every_action() {
        let state = state_with(&[("old", "1.0.0")]);
        let wiring = wiring_with(&[("http", "1.0.0")]);
        let modules = module_graph(&[("http", "1.0.0", false, None)]);

        let plan = compute(&state, &wiring, &modules, &DeploymentRequest::new());
        let rendered = plan.render();
        assert!(rendered.contains("uninstall old/1.0.0"));
        assert!(rendered.contains("install http/1.0.0"));
    }
}
