//! Requirement graph construction.
//!
//! One synthetic "requirer" is built per region. Its requirements are the
//! union of the requirements implied by the region's requested features and
//! by modules that are installed and still required, deduplicated so that
//! mutual region visibility never double-counts an edge.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use gantry_core::{FeatureId, ModuleId, RangePolicy, RegionId, Version, VersionRange};
use gantry_model::{Feature, Module, RegionFilters, Requirement};
use gantry_policy::PolicyFlags;

use crate::error::{ResolveError, ResolveResult};

/// The synthetic requirer for one region.
#[derive(Debug, Clone, Default)]
pub struct RegionNode {
    /// Features selected for this region's requirements.
    pub features: BTreeSet<FeatureId>,
    /// Modules pulled in by the selected features, keyed by identity.
    pub modules: BTreeMap<ModuleId, Module>,
    /// Aggregated requirements with the modules that raised each one.
    /// An empty requirer set means the requirement is synthetic (raised by
    /// an installed module no longer present in the candidate graph).
    pub requirements: Vec<(Requirement, BTreeSet<ModuleId>)>,
    /// Module locations referenced by a selected feature but absent from
    /// the module graph. These make the deployment partial, not the
    /// resolution unsatisfiable.
    pub missing_artifacts: BTreeSet<String>,
}

/// The full per-reconciliation input handed to the [`crate::Resolver`].
#[derive(Debug, Clone, Default)]
pub struct RequirementGraph {
    /// Synthetic requirers per region.
    pub regions: BTreeMap<RegionId, RegionNode>,
    /// Cross-region visibility filters in force for this resolution.
    pub filters: RegionFilters,
}

impl RequirementGraph {
    /// Prerequisite feature expressions declared by selected features,
    /// per region.
    #[must_use]
    pub fn prerequisites(&self, features: &[Feature]) -> BTreeMap<RegionId, BTreeSet<String>> {
        let mut out: BTreeMap<RegionId, BTreeSet<String>> = BTreeMap::new();
        for (region, node) in &self.regions {
            for id in &node.features {
                let Some(feature) = features.iter().find(|f| &f.id == id) else {
                    continue;
                };
                if !feature.prerequisites.is_empty() {
                    out.entry(region.clone())
                        .or_default()
                        .extend(feature.prerequisites.iter().cloned());
                }
            }
        }
        out
    }

    /// All module locations missing from the module graph, across regions.
    #[must_use]
    pub fn missing_artifacts(&self) -> BTreeSet<String> {
        self.regions
            .values()
            .flat_map(|n| n.missing_artifacts.iter().cloned())
            .collect()
    }
}

/// Builds a [`RequirementGraph`] from the effective (post-policy) module
/// graph and the desired requirements per region.
pub struct GraphBuilder<'a> {
    features: &'a [Feature],
    modules: &'a BTreeMap<String, Module>,
    filters: &'a RegionFilters,
    flags: Option<&'a PolicyFlags>,
    feature_resolution_range: RangePolicy,
}

impl<'a> GraphBuilder<'a> {
    /// Create a builder over the effective module graph.
    #[must_use]
    pub fn new(
        features: &'a [Feature],
        modules: &'a BTreeMap<String, Module>,
        filters: &'a RegionFilters,
    ) -> Self {
        Self {
            features,
            modules,
            filters,
            flags: None,
            feature_resolution_range: RangePolicy::Exact,
        }
    }

    /// Exclude blacklisted features and modules from candidate selection.
    #[must_use]
    pub fn with_flags(mut self, flags: &'a PolicyFlags) -> Self {
        self.flags = Some(flags);
        self
    }

    /// How literally a bare feature version reference is taken.
    #[must_use]
    pub fn with_resolution_range(mut self, policy: RangePolicy) -> Self {
        self.feature_resolution_range = policy;
        self
    }

    /// Build the graph for the given desired requirements.
    ///
    /// `installed_modules` carries the modules currently managed per region
    /// so requirements of still-required installs survive re-resolution.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoMatchingFeature`] when a requirement names
    /// a feature that does not exist at a matching version, and
    /// [`ResolveError::BlacklistedFeature`] when the only matches are
    /// blacklisted.
    pub fn build(
        &self,
        requirements_per_region: &BTreeMap<RegionId, BTreeSet<String>>,
        installed_modules: &BTreeMap<RegionId, BTreeSet<ModuleId>>,
    ) -> ResolveResult<RequirementGraph> {
        let mut graph = RequirementGraph {
            regions: BTreeMap::new(),
            filters: self.filters.clone(),
        };

        for (region, requirements) in requirements_per_region {
            let mut node = RegionNode::default();
            for expr in requirements {
                let feature = self.select_feature(region, expr)?;
                node.features.insert(feature.id.clone());
                self.collect_feature_modules(feature, &mut node);
            }
            // Conditionals: a nested set applies when another selected
            // feature in the same region provides the condition.
            let selected: Vec<FeatureId> = node.features.iter().cloned().collect();
            for id in &selected {
                let Some(feature) = self.features.iter().find(|f| &f.id == id) else {
                    continue;
                };
                for conditional in &feature.conditionals {
                    let holds = node.features.iter().any(|f| f.name == conditional.condition);
                    if holds {
                        for location in &conditional.modules {
                            self.include_module(location, &mut node);
                        }
                    }
                }
            }
            graph.regions.insert(region.clone(), node);
        }

        // Requirements of still-required installed modules keep existing
        // installations resolved across re-runs.
        for (region, ids) in installed_modules {
            let node = graph.regions.entry(region.clone()).or_default();
            for id in ids {
                if node.modules.contains_key(id) {
                    continue;
                }
                if let Some(module) = self.modules.values().find(|m| &m.id == id) {
                    for req in &module.requirements {
                        push_requirement(&mut node.requirements, req, None);
                    }
                }
            }
        }

        // Aggregate module requirements into each synthetic requirer.
        for node in graph.regions.values_mut() {
            let reqs: Vec<(ModuleId, Requirement)> = node
                .modules
                .values()
                .flat_map(|m| m.requirements.iter().map(|r| (m.id.clone(), r.clone())))
                .collect();
            for (id, req) in reqs {
                push_requirement(&mut node.requirements, &req, Some(id));
            }
        }

        debug!(regions = graph.regions.len(), "Built requirement graph");
        Ok(graph)
    }

    fn select_feature(&self, region: &RegionId, expr: &str) -> ResolveResult<&'a Feature> {
        let (name, range) = parse_feature_requirement(expr, self.feature_resolution_range);
        let mut matching: Vec<&Feature> = self
            .features
            .iter()
            .filter(|f| f.id.name == name && range.contains(&f.id.version))
            .collect();
        matching.sort_by(|a, b| a.id.version.cmp(&b.id.version));

        let Some(best_any) = matching.last().copied() else {
            return Err(ResolveError::NoMatchingFeature {
                region: region.clone(),
                requirement: expr.to_string(),
            });
        };
        let allowed = matching
            .into_iter()
            .rev()
            .find(|f| !self.is_feature_blacklisted(&f.id));
        allowed.ok_or_else(|| ResolveError::BlacklistedFeature {
            feature: best_any.id.clone(),
        })
    }

    fn collect_feature_modules(&self, feature: &Feature, node: &mut RegionNode) {
        for location in &feature.modules {
            self.include_module(location, node);
        }
    }

    fn include_module(&self, location: &str, node: &mut RegionNode) {
        if self
            .flags
            .is_some_and(|f| f.modules.contains(location))
        {
            debug!(location, "Skipping blacklisted module");
            return;
        }
        match self.modules.get(location) {
            Some(module) => {
                node.modules.insert(module.id.clone(), module.clone());
            },
            None => {
                node.missing_artifacts.insert(location.to_string());
            },
        }
    }

    fn is_feature_blacklisted(&self, id: &FeatureId) -> bool {
        self.flags.is_some_and(|f| f.features.contains(id))
    }
}

/// Merge a requirement into the aggregate, never double-counting an edge
/// that arrives through more than one path.
fn push_requirement(
    aggregate: &mut Vec<(Requirement, BTreeSet<ModuleId>)>,
    req: &Requirement,
    requirer: Option<ModuleId>,
) {
    if let Some((_, requirers)) = aggregate.iter_mut().find(|(existing, _)| existing == req) {
        if let Some(id) = requirer {
            requirers.insert(id);
        }
        return;
    }
    let mut requirers = BTreeSet::new();
    if let Some(id) = requirer {
        requirers.insert(id);
    }
    aggregate.push((req.clone(), requirers));
}

/// Parse a feature requirement expression: `name`, `name/version`, or
/// `name/[range)`. Bare versions expand through the resolution-range
/// policy.
fn parse_feature_requirement(expr: &str, policy: RangePolicy) -> (String, VersionRange) {
    match expr.split_once('/') {
        None => (expr.to_string(), VersionRange::any()),
        Some((name, version)) => {
            let range = if version.starts_with('[') || version.starts_with('(') {
                VersionRange::parse(version).unwrap_or_else(|_| VersionRange::any())
            } else {
                match Version::parse(version) {
                    Ok(v) if v == Version::zero() => VersionRange::any(),
                    Ok(v) => policy.range_for(&v),
                    Err(_) => VersionRange::any(),
                }
            };
            (name.to_string(), range)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(name: &str, version: &str, modules: &[&str]) -> Feature {
        let mut f = Feature::new(FeatureId::new(name, Version::parse(version).unwrap()));
        f.modules = modules.iter().map(ToString::to_string).collect();
        f
    }

    fn module(name: &str, version: &str) -> Module {
        let location = format!("mvn:example/{name}/{version}");
        Module::new(
            ModuleId::new(name, Version::parse(version).unwrap()),
            location,
        )
    }

    fn module_map(modules: &[Module]) -> BTreeMap<String, Module> {
        modules
            .iter()
            .map(|m| (m.location.clone(), m.clone()))
            .collect()
    }

    fn root_requirements(exprs: &[&str]) -> BTreeMap<RegionId, BTreeSet<String>> {
        let mut map = BTreeMap::new();
        map.insert(
            RegionId::root(),
            exprs.iter().map(ToString::to_string).collect(),
        );
        map
    }

    #[test]
    fn selects_highest_matching_feature() {
        let features = vec![
            feature("web", "1.0.0", &["mvn:example/http/1.0.0"]),
            feature("web", "1.2.0", &["mvn:example/http/1.2.0"]),
            feature("web", "2.0.0", &["mvn:example/http/2.0.0"]),
        ];
        let modules = module_map(&[module("http", "1.2.0")]);
        let filters = RegionFilters::new();

        let graph = GraphBuilder::new(&features, &modules, &filters)
            .build(&root_requirements(&["web/[1.0,2.0)"]), &BTreeMap::new())
            .unwrap();

        let node = &graph.regions[&RegionId::root()];
        assert_eq!(node.features.len(), 1);
        assert!(node
            .features
            .contains(&FeatureId::new("web", Version::new(1, 2, 0))));
    }

    #[test]
    fn unknown_feature_is_an_error() {
        let features = vec![feature("web", "1.0.0", &[])];
        let modules = BTreeMap::new();
        let filters = RegionFilters::new();

        let err = GraphBuilder::new(&features, &modules, &filters)
            .build(&root_requirements(&["nope"]), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoMatchingFeature { .. }));
    }

    #[test]
    fn blacklisted_feature_is_rejected() {
        let features = vec![feature("web", "1.0.0", &[])];
        let modules = BTreeMap::new();
        let filters = RegionFilters::new();
        let mut flags = PolicyFlags::default();
        flags
            .features
            .insert(FeatureId::new("web", Version::new(1, 0, 0)));

        let err = GraphBuilder::new(&features, &modules, &filters)
            .with_flags(&flags)
            .build(&root_requirements(&["web"]), &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::BlacklistedFeature { .. }));
    }

    #[test]
    fn missing_module_is_recorded_not_fatal() {
        let features = vec![feature("web", "1.0.0", &["mvn:example/ghost/1.0.0"])];
        let modules = BTreeMap::new();
        let filters = RegionFilters::new();

        let graph = GraphBuilder::new(&features, &modules, &filters)
            .build(&root_requirements(&["web"]), &BTreeMap::new())
            .unwrap();
        assert!(graph
            .missing_artifacts()
            .contains("mvn:example/ghost/1.0.0"));
    }

    #[test]
    fn conditional_modules_require_condition_feature() {
        let mut web = feature("web", "1.0.0", &["mvn:example/http/1.0.0"]);
        web.conditionals.push(gantry_model::Conditional {
            condition: "metrics".to_string(),
            modules: vec!["mvn:example/http-metrics/1.0.0".to_string()],
        });
        let metrics = feature("metrics", "1.0.0", &[]);
        let features = vec![web, metrics];
        let modules = module_map(&[module("http", "1.0.0"), module("http-metrics", "1.0.0")]);
        let filters = RegionFilters::new();
        let builder = GraphBuilder::new(&features, &modules, &filters);

        // Without the metrics feature the conditional stays out.
        let graph = builder
            .build(&root_requirements(&["web"]), &BTreeMap::new())
            .unwrap();
        assert_eq!(graph.regions[&RegionId::root()].modules.len(), 1);

        // With it, the conditional modules are pulled in.
        let graph = builder
            .build(&root_requirements(&["web", "metrics"]), &BTreeMap::new())
            .unwrap();
        assert_eq!(graph.regions[&RegionId::root()].modules.len(), 2);
    }

    #[test]
    fn requirements_are_not_double_counted() {
        let mut http = module("http", "1.0.0");
        http.requirements.push(Requirement {
            namespace: "service".to_string(),
            name: "log".to_string(),
            range: VersionRange::any(),
            optional: false,
        });
        let mut io = module("io", "1.0.0");
        io.requirements.push(Requirement {
            namespace: "service".to_string(),
            name: "log".to_string(),
            range: VersionRange::any(),
            optional: false,
        });
        let features = vec![feature(
            "web",
            "1.0.0",
            &["mvn:example/http/1.0.0", "mvn:example/io/1.0.0"],
        )];
        let modules = module_map(&[http, io]);
        let filters = RegionFilters::new();

        let graph = GraphBuilder::new(&features, &modules, &filters)
            .build(&root_requirements(&["web"]), &BTreeMap::new())
            .unwrap();

        let node = &graph.regions[&RegionId::root()];
        assert_eq!(node.requirements.len(), 1);
        assert_eq!(node.requirements[0].1.len(), 2);
    }
}
