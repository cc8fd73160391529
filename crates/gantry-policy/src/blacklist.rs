//! Blacklist clauses and their application to the module graph.
//!
//! Clause grammar: `<id-or-glob>[;<attr>=<value>]...` where the supported
//! attributes are `range=<version-or-range>` and
//! `type=feature|module|repository`. When no `type` is given, identifiers
//! containing a URI scheme separator (`:`) are treated as module location
//! globs, everything else as feature names.

use std::collections::BTreeSet;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};

use gantry_core::{FeatureId, Version, VersionRange};
use gantry_model::Feature;

/// How a feature clause constrains versions.
#[derive(Debug, Clone)]
enum VersionMatch {
    /// Every version of the named feature matches.
    Any,
    /// Exact version, ignoring a trailing all-zero qualifier.
    Exact(Version),
    /// Standard inclusive/exclusive range containment.
    Range(VersionRange),
}

impl VersionMatch {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => v.matches_ignoring_zero_qualifier(version),
            Self::Range(r) => r.contains(version),
        }
    }
}

#[derive(Debug, Clone)]
struct FeatureClause {
    name: String,
    version: VersionMatch,
}

/// Blacklist status computed once per load of the declaring descriptors.
///
/// A side table keyed by identity rather than flags on shared descriptor
/// values; re-applying the same clause set yields the same flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFlags {
    /// Features matched by a blacklist clause.
    pub features: BTreeSet<FeatureId>,
    /// Module locations matched directly or through a blacklisted feature's
    /// descriptor entries.
    pub modules: BTreeSet<String>,
}

/// A parsed set of blacklist clauses.
///
/// Construction never fails: malformed clauses are logged and ignored so a
/// single bad entry cannot abort filtering of the rest of the list.
#[derive(Debug, Default)]
pub struct Blacklist {
    features: Vec<FeatureClause>,
    modules: Vec<GlobMatcher>,
    repositories: Vec<GlobMatcher>,
}

impl Blacklist {
    /// Parse a clause list.
    pub fn new<I, S>(clauses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut blacklist = Self::default();
        for clause in clauses {
            let clause = clause.as_ref().trim();
            if clause.is_empty() {
                continue;
            }
            if let Err(reason) = blacklist.parse_clause(clause) {
                warn!(clause, reason = %reason, "Ignoring malformed blacklist clause");
            }
        }
        blacklist
    }

    /// Whether no clause was parsed at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.modules.is_empty() && self.repositories.is_empty()
    }

    fn parse_clause(&mut self, clause: &str) -> Result<(), String> {
        let mut parts = clause.split(';');
        let id = parts.next().unwrap_or_default().trim();
        if id.is_empty() {
            return Err("empty identifier".to_string());
        }

        let mut range: Option<&str> = None;
        let mut kind: Option<&str> = None;
        for attr in parts {
            match attr.trim().split_once('=') {
                Some(("range", v)) => range = Some(v.trim_matches('"')),
                Some(("type", v)) => kind = Some(v.trim_matches('"')),
                _ => return Err(format!("unrecognized attribute: {attr}")),
            }
        }

        let kind = kind.unwrap_or(if id.contains(':') { "module" } else { "feature" });
        match kind {
            "feature" => {
                let version = match range {
                    None => VersionMatch::Any,
                    Some(r) if r.starts_with('[') || r.starts_with('(') => {
                        VersionMatch::Range(VersionRange::parse(r).map_err(|e| e.to_string())?)
                    },
                    Some(v) => VersionMatch::Exact(Version::parse(v).map_err(|e| e.to_string())?),
                };
                self.features.push(FeatureClause {
                    name: id.to_string(),
                    version,
                });
            },
            "module" => self.modules.push(compile_glob(id)?),
            "repository" => self.repositories.push(compile_glob(id)?),
            other => return Err(format!("unknown clause type: {other}")),
        }
        Ok(())
    }

    /// Whether the named feature version is blacklisted.
    #[must_use]
    pub fn is_feature_blacklisted(&self, name: &str, version: &Version) -> bool {
        self.features
            .iter()
            .any(|c| c.name == name && c.version.matches(version))
    }

    /// Whether a module at the given location is blacklisted.
    #[must_use]
    pub fn is_module_blacklisted(&self, location: &str) -> bool {
        self.modules.iter().any(|g| g.is_match(location))
    }

    /// Whether a feature repository at the given URI is blacklisted.
    #[must_use]
    pub fn is_repository_blacklisted(&self, uri: &str) -> bool {
        self.repositories.iter().any(|g| g.is_match(uri))
    }

    /// Flag every blacklisted entity in the given graph.
    ///
    /// A clause matching a feature cascades to the modules the feature's
    /// descriptor lists directly (including nested conditional entries) but
    /// never to transitive capability providers - the cascade is
    /// deliberately shallow.
    #[must_use]
    pub fn apply<'a>(
        &self,
        features: &[Feature],
        module_locations: impl IntoIterator<Item = &'a str>,
    ) -> PolicyFlags {
        let mut flags = PolicyFlags::default();
        for feature in features {
            if self.is_feature_blacklisted(&feature.id.name, &feature.id.version) {
                flags.features.insert(feature.id.clone());
                for location in feature.directly_listed_modules() {
                    flags.modules.insert(location.to_string());
                }
            }
        }
        for location in module_locations {
            if self.is_module_blacklisted(location) {
                flags.modules.insert(location.to_string());
            }
        }
        if !flags.features.is_empty() || !flags.modules.is_empty() {
            debug!(
                features = flags.features.len(),
                modules = flags.modules.len(),
                "Applied blacklist"
            );
        }
        flags
    }
}

/// Compile a location glob. `*` and `?` match within a single path segment;
/// a `*` never crosses a separator.
fn compile_glob(pattern: &str) -> Result<GlobMatcher, String> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| e.to_string())
}
