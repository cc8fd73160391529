//! Modules: versioned, independently installable units with declared
//! capabilities and requirements.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use gantry_core::{ModuleId, Version, VersionRange};

use crate::error::{ModelError, ModelResult};

/// Something a module offers to the rest of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Capability namespace (e.g. `"service"`, `"package"`).
    pub namespace: String,
    /// Capability name within its namespace.
    pub name: String,
    /// Version at which the capability is provided.
    pub version: Version,
    /// Free-form attributes, matched by region visibility filters.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.namespace, self.name, self.version)
    }
}

/// A version-range-constrained reference to another module's capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Namespace the required capability must live in.
    pub namespace: String,
    /// Name of the required capability.
    pub name: String,
    /// Acceptable capability versions.
    pub range: VersionRange,
    /// Optional requirements do not fail resolution when unsatisfied.
    #[serde(default)]
    pub optional: bool,
}

impl Requirement {
    /// Whether the given capability satisfies this requirement, ignoring
    /// region visibility.
    #[must_use]
    pub fn is_satisfied_by(&self, cap: &Capability) -> bool {
        self.namespace == cap.namespace && self.name == cap.name && self.range.contains(&cap.version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.namespace, self.name, self.range)?;
        if self.optional {
            write!(f, " (optional)")?;
        }
        Ok(())
    }
}

/// How an override rule selected a replacement module, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    /// The module is not overridden.
    #[default]
    None,
    /// Replacement chosen by vendor-compatible exact id match.
    ExactMatch,
    /// Replacement chosen by an explicit `range=` attribute.
    RangeMatch,
}

/// Identity a module had before an override replaced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OriginalIdentity {
    location: String,
    version: Version,
}

/// A versioned, independently installable unit of code.
///
/// Immutable once parsed from its descriptor, except for the one-shot
/// override swap which preserves the original location and version for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Effective identity (symbolic name + version).
    pub id: ModuleId,
    /// Effective location URI.
    pub location: String,
    /// Declared vendor, when the descriptor carries one.
    pub vendor: Option<String>,
    /// Capabilities this module offers.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Requirements on other modules' capabilities.
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    /// Whether this is a mutable-version (snapshot) artifact.
    #[serde(default)]
    pub snapshot: bool,
    /// Content checksum supplied by the artifact loader, when known.
    pub checksum: Option<u64>,
    /// Original identity before an override replaced it.
    original: Option<OriginalIdentity>,
    /// How the override was selected.
    #[serde(default)]
    override_mode: OverrideMode,
}

impl Module {
    /// Build a module from its descriptor fields.
    #[must_use]
    pub fn new(id: ModuleId, location: impl Into<String>) -> Self {
        Self {
            id,
            location: location.into(),
            vendor: None,
            capabilities: Vec::new(),
            requirements: Vec::new(),
            snapshot: false,
            checksum: None,
            original: None,
            override_mode: OverrideMode::None,
        }
    }

    /// Record that this module replaced `original_location`/`original_version`
    /// through an override rule.
    ///
    /// Called on the replacement module after the swap; the original
    /// identity is preserved so diagnostics and [`Module::is_overridden`]
    /// stay accurate. Override flags are set exactly once per load.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::AlreadyOverridden`] if an override was already
    /// recorded.
    pub fn record_override(
        &mut self,
        original_location: impl Into<String>,
        original_version: Version,
        mode: OverrideMode,
    ) -> ModelResult<()> {
        if self.original.is_some() {
            return Err(ModelError::AlreadyOverridden(self.id.to_string()));
        }
        self.original = Some(OriginalIdentity {
            location: original_location.into(),
            version: original_version,
        });
        self.override_mode = mode;
        Ok(())
    }

    /// Whether an override rule replaced this module.
    #[must_use]
    pub fn is_overridden(&self) -> bool {
        self.original.is_some()
    }

    /// How the override was selected.
    #[must_use]
    pub fn override_mode(&self) -> OverrideMode {
        self.override_mode
    }

    /// The declared location before any override, or the effective location
    /// when no override applied.
    #[must_use]
    pub fn original_location(&self) -> &str {
        self.original
            .as_ref()
            .map_or(self.location.as_str(), |o| o.location.as_str())
    }

    /// The declared version before any override, or the effective version
    /// when no override applied.
    #[must_use]
    pub fn original_version(&self) -> &Version {
        self.original
            .as_ref()
            .map_or(&self.id.version, |o| &o.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(name: &str, version: Version) -> Module {
        let location = format!("mvn:example/{name}/{version}");
        Module::new(ModuleId::new(name, version), location)
    }

    #[test]
    fn override_preserves_original_identity() {
        let mut m = module("io", Version::new(1, 0, 1));
        m.record_override("mvn:example/io/1.0.0", Version::new(1, 0, 0), OverrideMode::ExactMatch)
            .unwrap();

        assert!(m.is_overridden());
        assert_eq!(m.override_mode(), OverrideMode::ExactMatch);
        assert_eq!(m.id.version, Version::new(1, 0, 1));
        assert_eq!(m.location, "mvn:example/io/1.0.1");
        assert_eq!(m.original_version(), &Version::new(1, 0, 0));
        assert_eq!(m.original_location(), "mvn:example/io/1.0.0");
    }

    #[test]
    fn override_is_one_shot() {
        let mut m = module("io", Version::new(1, 0, 1));
        m.record_override("x", Version::new(1, 0, 0), OverrideMode::RangeMatch)
            .unwrap();
        assert!(m
            .record_override("y", Version::new(1, 0, 0), OverrideMode::RangeMatch)
            .is_err());
    }

    #[test]
    fn requirement_satisfaction() {
        let req = Requirement {
            namespace: "service".to_string(),
            name: "log".to_string(),
            range: VersionRange::parse("[1.0,2.0)").unwrap(),
            optional: false,
        };
        let cap = Capability {
            namespace: "service".to_string(),
            name: "log".to_string(),
            version: Version::new(1, 5, 0),
            attributes: BTreeMap::new(),
        };
        assert!(req.is_satisfied_by(&cap));

        let wrong_ns = Capability {
            namespace: "package".to_string(),
            ..cap.clone()
        };
        assert!(!req.is_satisfied_by(&wrong_ns));
    }
}
