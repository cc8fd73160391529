//! Descriptor parsing.
//!
//! A module descriptor (`Module.toml`) declares a module's identity,
//! location, vendor, capabilities, and requirements. A feature repository
//! descriptor declares a set of features with their module references,
//! conditionals, and prerequisites. Both are parsed into model types here;
//! raw serde shapes are kept private so version fields can be validated.

use std::collections::BTreeMap;

use serde::Deserialize;

use gantry_core::{FeatureId, ModuleId, Version, VersionRange};

use crate::error::{ModelError, ModelResult};
use crate::feature::{Conditional, Feature};
use crate::module::{Capability, Module, Requirement};

/// The engine version descriptors are checked against.
const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct ModuleDescriptor {
    module: ModuleDef,
    #[serde(default, rename = "capability")]
    capabilities: Vec<CapabilityDef>,
    #[serde(default, rename = "requirement")]
    requirements: Vec<RequirementDef>,
}

#[derive(Debug, Deserialize)]
struct ModuleDef {
    name: String,
    version: String,
    location: String,
    vendor: Option<String>,
    #[serde(default)]
    snapshot: bool,
    checksum: Option<u64>,
    #[serde(rename = "engine-version")]
    engine_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CapabilityDef {
    namespace: String,
    name: String,
    version: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RequirementDef {
    namespace: String,
    name: String,
    range: Option<String>,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
struct RepositoryDescriptor {
    #[serde(default, rename = "feature")]
    features: Vec<FeatureDef>,
}

#[derive(Debug, Deserialize)]
struct FeatureDef {
    name: String,
    version: String,
    description: Option<String>,
    #[serde(default)]
    modules: Vec<String>,
    #[serde(default, rename = "conditional")]
    conditionals: Vec<ConditionalDef>,
    #[serde(default)]
    prerequisites: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ConditionalDef {
    condition: String,
    #[serde(default)]
    modules: Vec<String>,
}

fn check_engine(name: &str, required: Option<&str>) -> ModelResult<()> {
    let Some(required) = required else {
        return Ok(());
    };
    let req = semver::VersionReq::parse(required).map_err(|_| ModelError::IncompatibleEngine {
        name: name.to_string(),
        required: required.to_string(),
        current: ENGINE_VERSION.to_string(),
    })?;
    let current = semver::Version::parse(ENGINE_VERSION).map_err(|_| {
        ModelError::IncompatibleEngine {
            name: name.to_string(),
            required: required.to_string(),
            current: ENGINE_VERSION.to_string(),
        }
    })?;
    if req.matches(&current) {
        Ok(())
    } else {
        Err(ModelError::IncompatibleEngine {
            name: name.to_string(),
            required: required.to_string(),
            current: ENGINE_VERSION.to_string(),
        })
    }
}

fn parse_version(name: &str, s: &str) -> ModelResult<Version> {
    Version::parse(s).map_err(|source| ModelError::DescriptorVersion {
        name: name.to_string(),
        source,
    })
}

fn parse_range(name: &str, s: Option<&str>) -> ModelResult<VersionRange> {
    match s {
        None => Ok(VersionRange::any()),
        Some(s) => VersionRange::parse(s).map_err(|source| ModelError::DescriptorVersion {
            name: name.to_string(),
            source,
        }),
    }
}

/// Parse a `Module.toml` descriptor into a [`Module`].
///
/// # Errors
///
/// Returns [`ModelError`] when the TOML is malformed, a version field does
/// not parse, or the descriptor requires an incompatible engine version.
pub fn parse_module_descriptor(source: &str) -> ModelResult<Module> {
    let raw: ModuleDescriptor = toml::from_str(source).map_err(|e| ModelError::DescriptorParse {
        name: "Module.toml".to_string(),
        source: Box::new(e),
    })?;
    let name = raw.module.name.clone();
    check_engine(&name, raw.module.engine_version.as_deref())?;

    let version = parse_version(&name, &raw.module.version)?;
    let mut module = Module::new(ModuleId::new(&name, version), raw.module.location);
    module.vendor = raw.module.vendor;
    module.snapshot = raw.module.snapshot;
    module.checksum = raw.module.checksum;

    for cap in raw.capabilities {
        let version = match cap.version.as_deref() {
            Some(v) => parse_version(&name, v)?,
            None => module.id.version.clone(),
        };
        module.capabilities.push(Capability {
            namespace: cap.namespace,
            name: cap.name,
            version,
            attributes: cap.attributes,
        });
    }
    for req in raw.requirements {
        module.requirements.push(Requirement {
            range: parse_range(&name, req.range.as_deref())?,
            namespace: req.namespace,
            name: req.name,
            optional: req.optional,
        });
    }
    Ok(module)
}

/// Parse a feature repository descriptor into its [`Feature`]s.
///
/// # Errors
///
/// Returns [`ModelError`] when the TOML is malformed or a feature version
/// does not parse.
pub fn parse_feature_repository(source: &str) -> ModelResult<Vec<Feature>> {
    let raw: RepositoryDescriptor =
        toml::from_str(source).map_err(|e| ModelError::DescriptorParse {
            name: "feature repository".to_string(),
            source: Box::new(e),
        })?;

    let mut features = Vec::with_capacity(raw.features.len());
    for def in raw.features {
        let version = parse_version(&def.name, &def.version)?;
        let mut feature = Feature::new(FeatureId::new(&def.name, version));
        feature.description = def.description;
        feature.modules = def.modules;
        feature.conditionals = def
            .conditionals
            .into_iter()
            .map(|c| Conditional {
                condition: c.condition,
                modules: c.modules,
            })
            .collect();
        feature.prerequisites = def.prerequisites;
        features.push(feature);
    }
    Ok(features)
}
