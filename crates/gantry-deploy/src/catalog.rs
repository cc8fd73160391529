//! The catalog of deployable features and modules.

use std::collections::BTreeMap;

use tracing::debug;

use gantry_model::{
    parse_feature_repository, parse_module_descriptor, Feature, ModelResult, Module,
};

/// Everything known to be deployable: parsed feature repositories plus the
/// module graph keyed by location URI.
///
/// The catalog is the candidate set the deployer resolves against. It is
/// immutable during a reconciliation; policy filtering (blacklist,
/// overrides) works on per-run copies, never on the catalog itself.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    features: Vec<Feature>,
    modules: BTreeMap<String, Module>,
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an already-parsed feature.
    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Add an already-parsed module, keyed by its location.
    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.location.clone(), module);
    }

    /// Parse a feature repository descriptor and add its features.
    ///
    /// # Errors
    ///
    /// Returns a descriptor parse error when the TOML is malformed or
    /// declares an incompatible engine version.
    pub fn add_repository(&mut self, descriptor: &str) -> ModelResult<()> {
        let features = parse_feature_repository(descriptor)?;
        debug!(count = features.len(), "Added feature repository");
        self.features.extend(features);
        Ok(())
    }

    /// Parse a module descriptor and add the module.
    ///
    /// # Errors
    ///
    /// Returns a descriptor parse error when the TOML is malformed.
    pub fn add_module_descriptor(&mut self, descriptor: &str) -> ModelResult<()> {
        let module = parse_module_descriptor(descriptor)?;
        self.add_module(module);
        Ok(())
    }

    /// All known features.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// The module graph, keyed by location.
    #[must_use]
    pub fn modules(&self) -> &BTreeMap<String, Module> {
        &self.modules
    }
}
