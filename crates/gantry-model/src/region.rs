//! Region visibility filter tables.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use gantry_core::RegionId;

/// Per-region visibility policy:
/// `region -> peer region -> capability namespace -> filter expressions`.
///
/// A requirement in region A may only be satisfied by a capability in region
/// B when A's filter table has an entry for B covering the capability's
/// namespace whose expressions match the capability's attributes. Filter
/// expressions are globs over `name` and attribute values; the matching
/// itself lives in the resolution layer.
///
/// Regions are a flat map; mutual visibility (A sees B, B sees A) is legal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionFilters(
    pub BTreeMap<RegionId, BTreeMap<RegionId, BTreeMap<String, BTreeSet<String>>>>,
);

impl RegionFilters {
    /// An empty filter table: no cross-region visibility at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter expression allowing `from` to see capabilities in
    /// namespace `namespace` from `to` when `expr` matches.
    pub fn allow(
        &mut self,
        from: &RegionId,
        to: &RegionId,
        namespace: impl Into<String>,
        expr: impl Into<String>,
    ) {
        self.0
            .entry(from.clone())
            .or_default()
            .entry(to.clone())
            .or_default()
            .entry(namespace.into())
            .or_default()
            .insert(expr.into());
    }

    /// Filter expressions `from` applies to capabilities in `namespace`
    /// coming from `to`, or `None` when `to` is not visible at all.
    #[must_use]
    pub fn expressions(
        &self,
        from: &RegionId,
        to: &RegionId,
        namespace: &str,
    ) -> Option<&BTreeSet<String>> {
        self.0.get(from)?.get(to)?.get(namespace)
    }

    /// All regions named anywhere in the table, as sources or peers.
    #[must_use]
    pub fn regions(&self) -> BTreeSet<RegionId> {
        let mut out: BTreeSet<RegionId> = self.0.keys().cloned().collect();
        for peers in self.0.values() {
            out.extend(peers.keys().cloned());
        }
        out
    }

    /// Drop entries that reference regions outside `keep`.
    ///
    /// Used when regions disappear because their last module was removed,
    /// so persisted filters never point at dead regions.
    pub fn retain_regions(&mut self, keep: &BTreeSet<RegionId>) {
        self.0.retain(|region, _| keep.contains(region));
        for peers in self.0.values_mut() {
            peers.retain(|peer, _| keep.contains(peer));
        }
    }
}
