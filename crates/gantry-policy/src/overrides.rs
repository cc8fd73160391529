//! Override rules: best-effort substitution of declared modules with
//! compatible replacements.
//!
//! Clause grammar: `name/version[;range=<spec>]`. The clause names the
//! replacement; the replacement module itself (location, vendor,
//! capabilities) is looked up in the candidate set supplied by the caller,
//! typically the repository cache.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use gantry_core::{ModuleId, RangePolicy, VersionRange};
use gantry_model::{Module, OverrideMode};

#[derive(Debug, Clone)]
struct OverrideClause {
    id: ModuleId,
    range: Option<VersionRange>,
}

/// A parsed set of override clauses.
///
/// This is a best-effort best-match transform, not a validating one:
/// malformed clauses are logged and skipped, and modules without a
/// compatible clause pass through unchanged. There is no error path.
#[derive(Debug, Default)]
pub struct Overrides {
    clauses: Vec<OverrideClause>,
}

impl Overrides {
    /// Parse a clause list.
    pub fn new<I, S>(clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = Vec::new();
        for clause in clauses {
            let clause = clause.as_ref().trim();
            if clause.is_empty() {
                continue;
            }
            match parse_clause(clause) {
                Ok(c) => parsed.push(c),
                Err(reason) => {
                    warn!(clause, reason = %reason, "Ignoring malformed override clause");
                },
            }
        }
        Self { clauses: parsed }
    }

    /// Whether no clause was parsed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Replace map entries whose original declared module matches an
    /// override clause, looking replacements up in `candidates`.
    ///
    /// Selection per module:
    /// - a clause with `range=` applies when the original version falls in
    ///   the range ([`OverrideMode::RangeMatch`]);
    /// - a clause without a range applies only at compatible-vendor level:
    ///   same symbolic name, identical vendor when both declare one, and a
    ///   newer version within the original's minor line
    ///   ([`OverrideMode::ExactMatch`]);
    /// - among compatible clauses the highest replacement version wins.
    ///
    /// Replaced modules keep their original location and version available
    /// through [`Module::original_location`] / [`Module::original_version`].
    pub fn apply(&self, modules: &mut BTreeMap<String, Module>, candidates: &[Module]) {
        if self.clauses.is_empty() {
            return;
        }
        for (location, module) in modules.iter_mut() {
            if module.is_overridden() {
                continue;
            }
            let Some((candidate, mode)) = self.select(module, candidates) else {
                continue;
            };
            let mut replacement = candidate.clone();
            let original_version = module.id.version.clone();
            if replacement
                .record_override(location.clone(), original_version, mode)
                .is_err()
            {
                // Candidate already carries override provenance; leave the
                // declared module as-is rather than stacking overrides.
                continue;
            }
            debug!(
                original = %module.id,
                replacement = %replacement.id,
                mode = ?mode,
                "Overriding module"
            );
            *module = replacement;
        }
    }

    fn select<'a>(
        &self,
        original: &Module,
        candidates: &'a [Module],
    ) -> Option<(&'a Module, OverrideMode)> {
        let mut best: Option<(&Module, OverrideMode)> = None;
        for clause in &self.clauses {
            if clause.id.name != original.id.name || clause.id.version == original.id.version {
                continue;
            }
            let Some(candidate) = candidates.iter().find(|c| c.id == clause.id) else {
                debug!(clause = %clause.id, "Override replacement not in candidate set");
                continue;
            };
            let mode = match &clause.range {
                Some(range) => {
                    if !range.contains(&original.id.version) {
                        continue;
                    }
                    OverrideMode::RangeMatch
                },
                None => {
                    if !vendor_compatible(original, candidate) {
                        continue;
                    }
                    let update_range =
                        RangePolicy::SameMinor.range_for(&original.id.version);
                    if clause.id.version <= original.id.version
                        || !update_range.contains(&clause.id.version)
                    {
                        continue;
                    }
                    OverrideMode::ExactMatch
                },
            };
            match &best {
                Some((current, _)) if current.id.version >= candidate.id.version => {},
                _ => best = Some((candidate, mode)),
            }
        }
        best
    }
}

/// Vendors are compatible when equal or when either side does not declare
/// one. A differing declared vendor indicates a different upstream artifact.
fn vendor_compatible(original: &Module, candidate: &Module) -> bool {
    match (&original.vendor, &candidate.vendor) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn parse_clause(clause: &str) -> Result<OverrideClause, String> {
    let mut parts = clause.split(';');
    let id = parts.next().unwrap_or_default().trim();
    let id = ModuleId::parse(id).map_err(|e| e.to_string())?;

    let mut range = None;
    for attr in parts {
        match attr.trim().split_once('=') {
            Some(("range", v)) => {
                range = Some(VersionRange::parse(v.trim_matches('"')).map_err(|e| e.to_string())?);
            },
            _ => return Err(format!("unrecognized attribute: {attr}")),
        }
    }
    Ok(OverrideClause { id, range })
}
