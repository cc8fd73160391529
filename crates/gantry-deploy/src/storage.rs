//! Durable storage for [`DeploymentState`].

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::DeployResult;
use crate::state::DeploymentState;

/// JSON file storage with atomic replacement.
///
/// Saves write to a temporary file in the same directory and rename it over
/// the target, so a crash mid-write never leaves a truncated state file.
#[derive(Debug, Clone)]
pub struct StateStorage {
    path: PathBuf,
}

impl StateStorage {
    /// Storage backed by the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file this storage reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, or `None` when no state file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the file cannot be read, or a
    /// serialization error when its contents are not valid state JSON.
    pub fn load(&self) -> DeployResult<Option<DeploymentState>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let state = serde_json::from_str(&contents)?;
                Ok(Some(state))
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the state atomically.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the temporary file cannot be written or
    /// renamed into place.
    pub fn save(&self, state: &DeploymentState) -> DeployResult<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        let json = serde_json::to_string_pretty(state)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), "Persisted deployment state");
        Ok(())
    }
}
