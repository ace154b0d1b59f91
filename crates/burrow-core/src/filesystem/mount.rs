//! Mount utilities for container filesystem setup.
//!
//! Handles mount propagation, bind mounts for volumes, and the `/proc` and
//! `/dev` mounts made inside the container's namespace.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags, mount, umount2};

use super::overlayfs::mount_error;

const NONE: Option<&str> = None;

/// Recursively marks `/` as private in the current mount namespace.
///
/// Mount and unmount events below `/` stop propagating to and from the
/// host. Must happen before `pivot_root(2)`, which rejects shared mounts.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn make_root_private() -> Result<()> {
    mount(NONE, "/", NONE, MsFlags::MS_REC | MsFlags::MS_PRIVATE, NONE)
        .map_err(|e| mount_error(Path::new("/"), "private remount", e))?;
    tracing::debug!("root mount propagation set to private");
    Ok(())
}

/// Creates a recursive bind mount from `source` to `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` syscall fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    mount(
        Some(source),
        target,
        NONE,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        NONE,
    )
    .map_err(|e| mount_error(target, "bind mount", e))?;
    tracing::info!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Replaces any inherited `/proc` with one for the current PID namespace.
///
/// # Errors
///
/// Returns an error if `/proc` cannot be created or mounted.
pub fn mount_proc() -> Result<()> {
    let target = Path::new("/proc");
    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    // A stale /proc is only present when the base image shipped one mounted.
    if let Err(e) = umount2(target, MntFlags::MNT_DETACH) {
        tracing::debug!(error = %e, "no stale /proc to detach");
    }
    let flags = MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV;
    mount(Some("proc"), target, Some("proc"), flags, NONE)
        .map_err(|e| mount_error(target, "proc mount", e))?;
    tracing::debug!("/proc mounted");
    Ok(())
}

/// Mounts a fresh `tmpfs` at `/dev` with mode `0755`.
///
/// # Errors
///
/// Returns an error if `/dev` cannot be created or mounted.
pub fn mount_dev() -> Result<()> {
    let target = Path::new("/dev");
    std::fs::create_dir_all(target).map_err(|e| BurrowError::io(target, e))?;
    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME,
        Some("mode=755"),
    )
    .map_err(|e| mount_error(target, "dev mount", e))?;
    tracing::debug!("/dev tmpfs mounted");
    Ok(())
}

/// Lazily detaches the mount at `target`.
///
/// # Errors
///
/// Returns an error if the `umount2(2)` syscall fails.
pub fn detach_unmount(target: &Path) -> Result<()> {
    umount2(target, MntFlags::MNT_DETACH).map_err(|e| mount_error(target, "unmount", e))
}

/// Like [`detach_unmount`], but a target that is missing or not a mount
/// point is treated as already unmounted.
///
/// # Errors
///
/// Returns an error for any other `umount2(2)` failure.
pub fn detach_unmount_if_mounted(target: &Path) -> Result<()> {
    match umount2(target, MntFlags::MNT_DETACH) {
        Ok(()) => Ok(()),
        Err(Errno::EINVAL | Errno::ENOENT) => {
            tracing::debug!(target = %target.display(), "not mounted, skipping unmount");
            Ok(())
        }
        Err(e) => Err(mount_error(target, "unmount", e)),
    }
}
