//! Parent side of a container launch.
//!
//! The launcher prepares everything a container needs before any child
//! exists: the handoff channel, the layered root, the log sink, and a
//! fully described [`ContainerProcess`]. Starting the child and handing
//! off the command are left to the caller, which applies resource limits
//! in between.

use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use burrow_common::config::BurrowConfig;
use burrow_common::constants::{INIT_MARKER, SELF_EXE};
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerName, Volume};
use burrow_core::namespace::NamespaceConfig;

use crate::handoff::{self, HandoffSlot, HandoffWriter};
use crate::logs::create_log_file;
use crate::process::{ContainerProcess, StdioMode};
use crate::workspace::ContainerWorkspace;

/// What to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Share the launcher's terminal instead of logging to a file.
    pub interactive: bool,
    /// Name used for the workspace, info directory, and cgroup.
    pub container_name: ContainerName,
    /// Read-only base image directory.
    pub base_image: PathBuf,
    /// Host directory bound into the container.
    pub volume: Option<Volume>,
    /// Additional `KEY=VALUE` environment entries.
    pub extra_env: Vec<String>,
}

/// Builds container processes from [`LaunchRequest`]s.
#[derive(Debug, Clone)]
pub struct ContainerLauncher {
    config: BurrowConfig,
    namespaces: NamespaceConfig,
    slot: HandoffSlot,
    program: PathBuf,
}

impl ContainerLauncher {
    /// Creates a launcher re-executing the current binary into all namespaces.
    #[must_use]
    pub fn new(config: BurrowConfig) -> Self {
        Self {
            config,
            namespaces: NamespaceConfig::default(),
            slot: HandoffSlot::DEFAULT,
            program: PathBuf::from(SELF_EXE),
        }
    }

    /// Overrides the namespaces the child is cloned into.
    #[must_use]
    pub fn with_namespaces(mut self, namespaces: NamespaceConfig) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Overrides the descriptor slot of the handoff read end.
    #[must_use]
    pub const fn with_slot(mut self, slot: HandoffSlot) -> Self {
        self.slot = slot;
        self
    }

    /// Returns the configuration this launcher works with.
    #[must_use]
    pub const fn config(&self) -> &BurrowConfig {
        &self.config
    }

    /// Returns the workspace a request would use.
    #[must_use]
    pub fn workspace(&self, request: &LaunchRequest) -> ContainerWorkspace {
        ContainerWorkspace::new(
            &self.config,
            &request.container_name,
            request.base_image.clone(),
            request.volume.clone(),
        )
    }

    /// Prepares a container and describes its not-yet-started init process.
    ///
    /// The layered root is built and mounted before this returns; any
    /// failure aborts before a child exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the handoff channel, the log sink, the layered
    /// root, or the process description cannot be set up.
    pub fn construct(&self, request: &LaunchRequest) -> Result<(ContainerProcess, HandoffWriter)> {
        let name = &request.container_name;
        tracing::info!(
            container = %name,
            interactive = request.interactive,
            image = %request.base_image.display(),
            "constructing container"
        );

        let (read, writer) = handoff::channel()?;
        let workspace = self.workspace(request);

        let mut process = ContainerProcess::new(
            &self.program,
            &[INIT_MARKER],
            &workspace.mount_target,
            read,
            self.slot,
        )?;
        let _ = process.namespaces(self.namespaces.clone());
        let _ = process.env(merge_env(std::env::vars_os(), &request.extra_env))?;

        // The info dir is only created once the root exists, so a failed
        // build leaves nothing behind.
        workspace.build()?;
        let stdio = match self.stdio_for(request) {
            Ok(stdio) => stdio,
            Err(e) => {
                if let Err(teardown) = workspace.teardown() {
                    tracing::warn!(container = %name, error = %teardown, "failed to tear down workspace");
                }
                return Err(e);
            }
        };
        let _ = process.stdio(stdio);
        Ok((process, writer))
    }

    fn stdio_for(&self, request: &LaunchRequest) -> Result<StdioMode> {
        if request.interactive {
            return Ok(StdioMode::Inherit);
        }
        let log = create_log_file(&self.config, request.container_name.as_str())?;
        Ok(StdioMode::Redirect {
            log,
            null: open_null()?,
        })
    }
}

/// Host environment followed by `extra`; an extra entry replaces the host
/// variable of the same name.
fn merge_env(
    host: impl Iterator<Item = (OsString, OsString)>,
    extra: &[String],
) -> Vec<OsString> {
    let overridden: Vec<&str> = extra
        .iter()
        .filter_map(|entry| entry.split_once('=').map(|(key, _)| key))
        .collect();
    host.filter(|(key, _)| !overridden.iter().any(|k| key.as_os_str() == OsStr::new(*k)))
        .map(|(key, value)| {
            let mut entry = key;
            entry.push("=");
            entry.push(value);
            entry
        })
        .chain(extra.iter().map(OsString::from))
        .collect()
}

fn open_null() -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .map_err(|e| BurrowError::io("/dev/null", e))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    fn config_in(dir: &Path) -> BurrowConfig {
        BurrowConfig {
            root_dir: dir.join("root"),
            mount_root: dir.join("mnt"),
            info_root: dir.join("run"),
            default_image: dir.join("busybox"),
            ..BurrowConfig::default()
        }
    }

    fn request(dir: &Path, interactive: bool) -> LaunchRequest {
        LaunchRequest {
            interactive,
            container_name: ContainerName::new("web").unwrap(),
            base_image: dir.join("busybox"),
            volume: None,
            extra_env: vec!["GREETING=hello".into()],
        }
    }

    #[test]
    fn workspace_follows_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ContainerLauncher::new(config_in(dir.path()));
        let ws = launcher.workspace(&request(dir.path(), true));

        assert_eq!(ws.mount_target, dir.path().join("mnt/web"));
        assert_eq!(ws.base_image, dir.path().join("busybox"));
    }

    #[test]
    fn missing_base_image_fails_before_any_mount() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ContainerLauncher::new(config_in(dir.path()));

        let err = launcher.construct(&request(dir.path(), true)).unwrap_err();

        assert!(matches!(err, BurrowError::NotFound { kind: "base image", .. }));
        assert!(!dir.path().join("mnt/web").exists());
        assert!(!dir.path().join("root/writeLayer/web").exists());
    }

    #[test]
    fn failed_batch_build_leaves_no_info_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ContainerLauncher::new(config_in(dir.path()));

        let err = launcher.construct(&request(dir.path(), false)).unwrap_err();

        assert!(matches!(err, BurrowError::NotFound { kind: "base image", .. }));
        assert!(!dir.path().join("run/web").exists());
    }

    #[test]
    fn batch_launch_creates_log_sink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ContainerLauncher::new(config_in(dir.path()));

        let stdio = launcher.stdio_for(&request(dir.path(), false)).unwrap();

        assert!(matches!(stdio, StdioMode::Redirect { .. }));
        assert!(dir.path().join("run/web/container.log").is_file());
    }

    #[test]
    fn interactive_launch_inherits_terminal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ContainerLauncher::new(config_in(dir.path()));

        let stdio = launcher.stdio_for(&request(dir.path(), true)).unwrap();

        assert!(matches!(stdio, StdioMode::Inherit));
        assert!(!dir.path().join("run/web").exists());
    }

    #[test]
    fn extra_env_replaces_host_variables() {
        let host = [
            (OsString::from("PATH"), OsString::from("/bin")),
            (OsString::from("BURROW_CONFIG"), OsString::from("rel.json")),
        ];
        let merged = merge_env(
            host.into_iter(),
            &["BURROW_CONFIG=/etc/burrow.json".into(), "A=1".into()],
        );
        assert_eq!(merged, ["PATH=/bin", "BURROW_CONFIG=/etc/burrow.json", "A=1"]);
    }

    #[test]
    fn malformed_extra_env_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("busybox")).unwrap();
        let launcher = ContainerLauncher::new(config_in(dir.path()));
        let mut req = request(dir.path(), true);
        req.extra_env = vec!["NOEQUALS".into()];

        let err = launcher.construct(&req).unwrap_err();

        assert!(matches!(err, BurrowError::Config { .. }));
        assert!(!dir.path().join("root/writeLayer/web").exists());
    }
}
