//! Global configuration model for the Burrow runtime.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// How the initializer obtains the layered view it swaps into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RootLayering {
    /// The launcher already mounted the overlay at the mount target; the
    /// initializer pivots straight into it.
    #[default]
    Premounted,
    /// The initializer mounts a second overlay built from `upper`, `work`,
    /// and `lower` subdirectories of the new root onto the new root itself
    /// before pivoting.
    SelfOverlay,
}

/// Root configuration for the Burrow runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowConfig {
    /// Directory holding writable layers and overlay work dirs.
    pub root_dir: PathBuf,
    /// Directory under which merged container roots are mounted.
    pub mount_root: PathBuf,
    /// Directory holding per-container info directories.
    pub info_root: PathBuf,
    /// Base image used when `run` is not given one.
    pub default_image: PathBuf,
    /// Root layering strategy used by the initializer.
    pub root_layering: RootLayering,
}

impl Default for BurrowConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(crate::constants::DEFAULT_ROOT_DIR),
            mount_root: PathBuf::from(crate::constants::DEFAULT_MOUNT_ROOT),
            info_root: PathBuf::from(crate::constants::DEFAULT_INFO_ROOT),
            default_image: PathBuf::from(crate::constants::DEFAULT_BASE_IMAGE),
            root_layering: RootLayering::default(),
        }
    }
}

impl BurrowConfig {
    /// Loads a configuration file, or returns the defaults when no path is given.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| BurrowError::io(path, e))?;
        let config: Self = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }

    /// Returns the info directory of a container.
    #[must_use]
    pub fn info_dir(&self, container_name: &str) -> PathBuf {
        self.info_root.join(container_name)
    }

    /// Returns the stdout log path of a batch container.
    #[must_use]
    pub fn log_path(&self, container_name: &str) -> PathBuf {
        self.info_dir(container_name)
            .join(crate::constants::CONTAINER_LOG_FILE)
    }
}
