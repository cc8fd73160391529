//! Features: named, versioned bundles of module references.

use serde::{Deserialize, Serialize};

use gantry_core::FeatureId;

/// A module set included only when its condition holds.
///
/// The condition names a capability (or another feature) that must also be
/// present in the resolved region for the nested modules to be pulled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditional {
    /// The capability or feature name that gates this set.
    pub condition: String,
    /// Location URIs of the modules included when the condition holds.
    #[serde(default)]
    pub modules: Vec<String>,
}

/// A named, versioned collection of module references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature identity.
    pub id: FeatureId,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Location URIs of the modules this feature directly references.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Nested conditional module sets.
    #[serde(default)]
    pub conditionals: Vec<Conditional>,
    /// Feature requirements (`name/version-or-range`) that must already be
    /// installed before this feature can be deployed.
    ///
    /// Prerequisites are deployed in a separate, earlier reconciliation
    /// cycle; requesting a feature whose prerequisites are absent raises a
    /// partial-deployment error rather than silently pulling them in.
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl Feature {
    /// Build an empty feature with the given identity.
    #[must_use]
    pub fn new(id: FeatureId) -> Self {
        Self {
            id,
            description: None,
            modules: Vec::new(),
            conditionals: Vec::new(),
            prerequisites: Vec::new(),
        }
    }

    /// All module locations named directly by this feature's descriptor:
    /// the direct references plus every nested conditional entry.
    ///
    /// This is the (deliberately shallow) set a cascading blacklist covers.
    pub fn directly_listed_modules(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .map(String::as_str)
            .chain(
                self.conditionals
                    .iter()
                    .flat_map(|c| c.modules.iter().map(String::as_str)),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::Version;

    #[test]
    fn directly_listed_includes_conditionals() {
        let mut f = Feature::new(FeatureId::new("web", Version::new(1, 0, 0)));
        f.modules.push("mvn:a/1.0.0".to_string());
        f.conditionals.push(Conditional {
            condition: "http".to_string(),
            modules: vec!["mvn:b/1.0.0".to_string()],
        });

        let listed: Vec<&str> = f.directly_listed_modules().collect();
        assert_eq!(listed, vec!["mvn:a/1.0.0", "mvn:b/1.0.0"]);
    }
}
