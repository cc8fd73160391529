//! The solver seam and its reference implementation.

use std::collections::BTreeSet;

use globset::GlobBuilder;
use tracing::{debug, warn};

use gantry_core::{ModuleId, RegionId};
use gantry_model::Capability;

use crate::error::{ResolveError, ResolveResult, UnsatisfiedRequirement};
use crate::graph::{RegionNode, RequirementGraph};
use crate::wiring::{ResourceId, Wire, Wiring};

/// Turns a requirement graph into a wiring, or reports why it cannot.
///
/// The deployer treats this as an opaque constraint solver. Implementations
/// must be pure: same graph in, same wiring out, no side effects.
pub trait Resolver {
    /// Resolve the graph into a consistent wiring.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unsatisfied`] listing every mandatory
    /// requirement no visible capability satisfies.
    fn resolve(&self, graph: &RequirementGraph) -> ResolveResult<Wiring>;
}

/// Highest-version-wins resolver.
///
/// For each requirement it picks the matching visible capability with the
/// highest version, breaking ties by provider module identity. It never
/// backtracks, which is sufficient as long as module capability sets are
/// conflict-free.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyResolver;

impl GreedyResolver {
    /// Create a resolver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A capability candidate visible to some requirement.
struct Candidate<'a> {
    region: &'a RegionId,
    module: &'a ModuleId,
    capability: &'a Capability,
}

impl Resolver for GreedyResolver {
    fn resolve(&self, graph: &RequirementGraph) -> ResolveResult<Wiring> {
        let mut wiring = Wiring::default();
        for (region, node) in &graph.regions {
            wiring
                .features_per_region
                .insert(region.clone(), node.features.clone());
            wiring.modules_per_region.insert(
                region.clone(),
                node.modules
                    .iter()
                    .map(|(id, m)| (id.clone(), m.location.clone()))
                    .collect(),
            );
        }

        let mut unsatisfied = Vec::new();
        for (region, node) in &graph.regions {
            for (requirement, requirers) in &node.requirements {
                let candidates = visible_candidates(graph, region, node, &requirement.namespace);
                let best = candidates
                    .into_iter()
                    .filter(|c| requirement.is_satisfied_by(c.capability))
                    .max_by(|a, b| {
                        a.capability
                            .version
                            .cmp(&b.capability.version)
                            .then_with(|| b.module.cmp(a.module))
                    });

                let Some(chosen) = best else {
                    if requirement.optional {
                        debug!(
                            region = %region,
                            requirement = %requirement,
                            "Optional requirement left unsatisfied"
                        );
                    } else {
                        unsatisfied.push(UnsatisfiedRequirement {
                            region: region.clone(),
                            requirement: requirement.clone(),
                        });
                    }
                    continue;
                };

                let wire = Wire {
                    requirement: requirement.clone(),
                    provider: ResourceId::Module {
                        region: chosen.region.clone(),
                        id: chosen.module.clone(),
                    },
                    capability: chosen.capability.clone(),
                };
                if requirers.is_empty() {
                    wiring
                        .wires
                        .entry(ResourceId::Region(region.clone()))
                        .or_default()
                        .push(wire);
                } else {
                    for requirer in requirers {
                        wiring
                            .wires
                            .entry(ResourceId::Module {
                                region: region.clone(),
                                id: requirer.clone(),
                            })
                            .or_default()
                            .push(wire.clone());
                    }
                }
            }
        }

        if unsatisfied.is_empty() {
            Ok(wiring)
        } else {
            Err(ResolveError::Unsatisfied(unsatisfied))
        }
    }
}

/// Capabilities a requirement in `region` may be wired to: everything local,
/// plus peer-region capabilities the visibility filters let through.
fn visible_candidates<'a>(
    graph: &'a RequirementGraph,
    region: &'a RegionId,
    node: &'a RegionNode,
    namespace: &str,
) -> Vec<Candidate<'a>> {
    let mut out = Vec::new();
    for (id, module) in &node.modules {
        for capability in &module.capabilities {
            if capability.namespace == namespace {
                out.push(Candidate {
                    region,
                    module: id,
                    capability,
                });
            }
        }
    }
    for (peer, peer_node) in &graph.regions {
        if peer == region {
            continue;
        }
        let Some(exprs) = graph.filters.expressions(region, peer, namespace) else {
            continue;
        };
        for (id, module) in &peer_node.modules {
            for capability in &module.capabilities {
                if capability.namespace == namespace && filter_matches(exprs, capability) {
                    out.push(Candidate {
                        region: peer,
                        module: id,
                        capability,
                    });
                }
            }
        }
    }
    out
}

/// Whether any filter expression matches the capability's name or one of its
/// attribute values. Malformed globs are skipped with a warning so one bad
/// filter never blocks an entire region.
fn filter_matches(exprs: &BTreeSet<String>, capability: &Capability) -> bool {
    exprs.iter().any(|expr| {
        let glob = match GlobBuilder::new(expr).literal_separator(true).build() {
            Ok(g) => g.compile_matcher(),
            Err(err) => {
                warn!(expr, error = %err, "Skipping malformed visibility filter");
                return false;
            },
        };
        glob.is_match(&capability.name)
            || capability.attributes.values().any(|v| glob.is_match(v))
    })
}
