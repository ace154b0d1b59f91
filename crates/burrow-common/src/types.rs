//! Domain primitive types used across the Burrow workspace.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Length of generated container names.
const GENERATED_NAME_LEN: usize = 10;

/// Name of a container.
///
/// Used verbatim as a path component for the writable layer, mount target,
/// info directory, and cgroup, so it may not contain `/` or be `.`/`..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerName(String);

impl ContainerName {
    /// Creates a container name after validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, `.`, `..`, or contains `/`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(BurrowError::Config {
                message: format!("invalid container name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Generates a random container name.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(GENERATED_NAME_LEN);
        Self(id)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    /// Workspace built, init process not started yet.
    Created,
    /// Init process started.
    Running,
    /// Init process exited.
    Stopped,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Resource limits handed to the cgroup subsystems.
///
/// Values are kernel-format strings written verbatim into the control
/// files (`"100m"`, `"max"`, `"512"`). An absent value leaves the
/// corresponding controller untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit, e.g. `"100m"`.
    pub memory_limit: Option<String>,
    /// Relative CPU weight (`cpu.weight` or `cpu.shares`).
    pub cpu_shares: Option<String>,
    /// Maximum number of tasks.
    pub pids_max: Option<String>,
}

impl ResourceConfig {
    /// Returns whether no limit is configured at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.memory_limit.is_none() && self.cpu_shares.is_none() && self.pids_max.is_none()
    }
}

/// A host directory bound into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Directory on the host.
    pub host_path: PathBuf,
    /// Path inside the container, relative to its root.
    pub container_path: PathBuf,
}

impl Volume {
    /// Parses a `host:container` volume specification.
    ///
    /// Returns `Ok(None)` for an empty specification.
    ///
    /// # Errors
    ///
    /// Returns an error unless the specification has exactly two non-empty
    /// colon-separated components, or if the container path contains `..`
    /// or `.` components.
    pub fn parse(spec: &str) -> Result<Option<Self>> {
        if spec.is_empty() {
            return Ok(None);
        }
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [host, container] if !host.is_empty() && !container.is_empty() => {
                let container_path = PathBuf::from(container);
                if !stays_below_root(&container_path) {
                    return Err(BurrowError::Config {
                        message: format!(
                            "volume container path must stay inside the container: {container:?}"
                        ),
                    });
                }
                Ok(Some(Self {
                    host_path: PathBuf::from(host),
                    container_path,
                }))
            }
            _ => Err(BurrowError::Config {
                message: format!("volume must be <host>:<container>, got {spec:?}"),
            }),
        }
    }

    /// Returns whether the container path cannot leave the container root.
    #[must_use]
    pub fn stays_inside_root(&self) -> bool {
        stays_below_root(&self.container_path)
    }

    /// Returns the bind target of this volume under a mounted root.
    ///
    /// Leading `/` on the container path is ignored. The target stays inside
    /// `root` as long as [`Self::stays_inside_root`] holds, which
    /// [`Self::parse`] guarantees.
    #[must_use]
    pub fn target_under(&self, root: &Path) -> PathBuf {
        let relative = self
            .container_path
            .strip_prefix("/")
            .unwrap_or(&self.container_path);
        root.join(relative)
    }
}

/// Whether `path` only has plain components below an optional leading `/`.
fn stays_below_root(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::RootDir | Component::Normal(_)))
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_volume_spec_is_absent() {
        assert_eq!(Volume::parse("").unwrap(), None);
    }

    #[test]
    fn two_part_volume_spec_parses() {
        let volume = Volume::parse("hostdir:containerdir").unwrap().unwrap();
        assert_eq!(volume.host_path, PathBuf::from("hostdir"));
        assert_eq!(volume.container_path, PathBuf::from("containerdir"));
    }

    #[test]
    fn malformed_volume_specs_are_config_errors() {
        for spec in ["a:b:c", "a:", ":b", ":", "nocolon", "a:../b", "a:x/../../b", "a:/.."] {
            let err = Volume::parse(spec).unwrap_err();
            assert!(
                matches!(err, BurrowError::Config { .. }),
                "{spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn absolute_container_path_stays_under_root() {
        let volume = Volume::parse("/data:/srv/data").unwrap().unwrap();
        assert_eq!(
            volume.target_under(Path::new("/mnt/web")),
            PathBuf::from("/mnt/web/srv/data")
        );
    }

    #[test]
    fn hand_built_escaping_volume_is_detected() {
        let volume = Volume {
            host_path: PathBuf::from("/data"),
            container_path: PathBuf::from("../../etc"),
        };
        assert!(!volume.stays_inside_root());
    }

    #[test]
    fn nested_container_path_is_accepted() {
        let volume = Volume::parse("/data:/srv/app/data").unwrap().unwrap();
        assert_eq!(
            volume.target_under(Path::new("/mnt/web")),
            PathBuf::from("/mnt/web/srv/app/data")
        );
    }

    #[test]
    fn container_name_rejects_path_components() {
        assert!(ContainerName::new("web").is_ok());
        for bad in ["", ".", "..", "a/b"] {
            assert!(ContainerName::new(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn generated_names_are_short_and_distinct() {
        let a = ContainerName::generate();
        let b = ContainerName::generate();
        assert_eq!(a.as_str().len(), GENERATED_NAME_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn resource_config_default_is_empty() {
        assert!(ResourceConfig::default().is_empty());
        let cfg = ResourceConfig {
            memory_limit: Some("100m".into()),
            ..ResourceConfig::default()
        };
        assert!(!cfg.is_empty());
    }
}
