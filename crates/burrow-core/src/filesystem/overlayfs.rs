//! `OverlayFS` management for layered container filesystems.
//!
//! Stacks a read-only lower layer with a single writable upper layer,
//! giving each container copy-on-write access to a shared base image.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use nix::mount::{MsFlags, mount};

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Read-only lower layers (top to bottom, as the kernel expects).
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`; must be distinct from the upper dir.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Renders the `lowerdir=...,upperdir=...,workdir=...` mount data.
    #[must_use]
    pub fn options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "lowerdir={},upperdir={},workdir={}",
            lowers,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// then issues the `mount(2)` syscall with overlay-specific options.
///
/// # Errors
///
/// Returns an error if directory creation fails or if the mount syscall
/// fails (no overlay support, target already mounted, missing privilege).
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    if config.upper_dir == config.work_dir {
        return Err(BurrowError::Config {
            message: format!(
                "overlay upper and work dirs must differ: {}",
                config.upper_dir.display()
            ),
        });
    }
    for dir in [&config.upper_dir, &config.work_dir, &config.merged_dir] {
        std::fs::create_dir_all(dir).map_err(|e| BurrowError::io(dir, e))?;
    }

    let opts = config.options();
    tracing::debug!(merged = %config.merged_dir.display(), %opts, "mounting overlayfs");
    mount(
        Some("overlay"),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|e| mount_error(&config.merged_dir, "overlay mount", e))?;

    tracing::info!(merged = %config.merged_dir.display(), "overlayfs mounted");
    Ok(())
}

/// Wraps a `nix` errno into a [`BurrowError::Mount`].
pub(crate) fn mount_error(
    target: &Path,
    operation: &'static str,
    errno: nix::errno::Errno,
) -> BurrowError {
    BurrowError::Mount {
        target: target.to_path_buf(),
        operation,
        source: std::io::Error::from(errno),
    }
}
