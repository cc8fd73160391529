//! Resolver output: wires from requirements to the capabilities chosen to
//! satisfy them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use gantry_core::{FeatureId, ModuleId, RegionId};
use gantry_model::{Capability, Requirement};

/// Identity of a resource in the requirement graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceId {
    /// The synthetic requirer standing in for a region's requested state.
    Region(RegionId),
    /// A concrete module resolved into a region.
    Module {
        /// Region the module is resolved into.
        region: RegionId,
        /// The module's identity.
        id: ModuleId,
    },
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Region(r) => write!(f, "region:{r}"),
            Self::Module { region, id } => write!(f, "{region}/{id}"),
        }
    }
}

/// One resolved edge: a requirement satisfied by a provider's capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    /// The requirement being satisfied.
    pub requirement: Requirement,
    /// The resource providing the capability.
    pub provider: ResourceId,
    /// The capability chosen.
    pub capability: Capability,
}

/// The complete resolver output for one reconciliation.
///
/// Produced fresh per `deploy()` call and never persisted - only its
/// effects (which modules end up managed) reach `DeploymentState`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Wiring {
    /// Resolved edges per requiring resource.
    pub wires: BTreeMap<ResourceId, Vec<Wire>>,
    /// Concrete modules chosen per region, with their locations.
    pub modules_per_region: BTreeMap<RegionId, BTreeMap<ModuleId, String>>,
    /// Features realized per region.
    pub features_per_region: BTreeMap<RegionId, BTreeSet<FeatureId>>,
}

impl Wiring {
    /// Features per region as plain id sets, for diffing against state.
    #[must_use]
    pub fn installed_features(&self) -> BTreeMap<RegionId, BTreeSet<FeatureId>> {
        self.features_per_region.clone()
    }

    /// Look up the location a module was resolved from, in any region.
    #[must_use]
    pub fn location_of(&self, id: &ModuleId) -> Option<&str> {
        self.modules_per_region
            .values()
            .find_map(|modules| modules.get(id).map(String::as_str))
    }
}
