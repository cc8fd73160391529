use gantry_core::{IdParseError, VersionError};
use thiserror::Error;

/// Errors produced while building the module graph.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A descriptor failed to parse as TOML.
    #[error("failed to parse descriptor {name}: {source}")]
    DescriptorParse {
        /// Descriptor name or location for diagnostics.
        name: String,
        /// The underlying TOML error.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// A version or range field inside a descriptor is malformed.
    #[error("invalid version in descriptor {name}: {source}")]
    DescriptorVersion {
        /// Descriptor name or location for diagnostics.
        name: String,
        /// The underlying version error.
        #[source]
        source: VersionError,
    },
    /// A prerequisite or dependency identifier is malformed.
    #[error("invalid identifier in descriptor {name}: {source}")]
    DescriptorId {
        /// Descriptor name or location for diagnostics.
        name: String,
        /// The underlying identifier error.
        #[source]
        source: IdParseError,
    },
    /// The descriptor requires a newer engine than this one.
    #[error("descriptor {name} requires engine version {required}, this engine is {current}")]
    IncompatibleEngine {
        /// Descriptor name or location for diagnostics.
        name: String,
        /// The declared engine requirement.
        required: String,
        /// The running engine version.
        current: String,
    },
    /// A module was overridden twice; override flags are set exactly once.
    #[error("module {0} is already overridden")]
    AlreadyOverridden(String),
}

/// A specialized Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
