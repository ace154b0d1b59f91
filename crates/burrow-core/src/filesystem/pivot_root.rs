//! Root filesystem switching via `pivot_root(2)`.
//!
//! The old root is parked under the new one and then detached, so nothing
//! of the host tree stays reachable from the container.
//!
//! Every function here changes process-wide state that cannot be undone.
//! They are only called from the container initializer.

use std::path::{Path, PathBuf};

use burrow_common::config::RootLayering;
use burrow_common::constants::PIVOT_PARKING_DIR;
use burrow_common::error::{BurrowError, Result};
use nix::unistd::chdir;

use super::mount::detach_unmount;
use super::overlayfs::{OverlayConfig, mount_overlay, mount_error};

/// Makes `new_root` the root of the calling process.
///
/// With [`RootLayering::SelfOverlay`] an overlay built from the `upper`,
/// `work`, and `lower` subdirectories of `new_root` is first mounted onto
/// `new_root` itself. With [`RootLayering::Premounted`] `new_root` must
/// already be a mount point.
///
/// The sequence is not reentrant and has no rollback: a failure after
/// `pivot_root(2)` leaves the namespace in a hybrid state.
///
/// # Errors
///
/// Returns an error if any mount, directory, or `pivot_root(2)` step fails.
pub fn swap_root(new_root: &Path, layering: RootLayering) -> Result<()> {
    let new_root = std::path::absolute(new_root).map_err(|e| BurrowError::io(new_root, e))?;
    tracing::info!(new_root = %new_root.display(), ?layering, "swapping root");

    if layering == RootLayering::SelfOverlay {
        let overlay = self_overlay(&new_root);
        for lower in &overlay.lower_dirs {
            std::fs::create_dir_all(lower).map_err(|e| BurrowError::io(lower, e))?;
        }
        mount_overlay(&overlay)?;
    }

    // Created after any overlay mount, which would hide it otherwise.
    let parking = new_root.join(PIVOT_PARKING_DIR);
    match std::fs::create_dir(&parking) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(BurrowError::io(&parking, e)),
    }

    pivot_root(&new_root, &parking)?;

    let parked = Path::new("/").join(PIVOT_PARKING_DIR);
    detach_unmount(&parked)?;
    std::fs::remove_dir(&parked).map_err(|e| BurrowError::io(&parked, e))?;
    tracing::info!("old root detached");
    Ok(())
}

/// Switches the root filesystem to `new_root` using `pivot_root(2)`.
///
/// The old root is moved to `put_old` and the working directory is reset
/// to the new `/`. The old root should be unmounted afterward.
///
/// # Errors
///
/// Returns an error if `pivot_root(2)` or the subsequent `chdir` fails.
pub fn pivot_root(new_root: &Path, put_old: &Path) -> Result<()> {
    nix::unistd::pivot_root(new_root, put_old)
        .map_err(|e| mount_error(new_root, "pivot_root", e))?;
    chdir("/").map_err(|e| mount_error(Path::new("/"), "chdir", e))?;
    tracing::debug!(new_root = %new_root.display(), "pivot_root complete");
    Ok(())
}

/// Overlay mounted onto `root` from its own `lower`/`upper`/`work` subdirectories.
fn self_overlay(root: &Path) -> OverlayConfig {
    OverlayConfig {
        lower_dirs: vec![root.join("lower")],
        upper_dir: root.join("upper"),
        work_dir: root.join("work"),
        merged_dir: PathBuf::from(root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_overlay_is_built_from_root_subdirectories() {
        let config = self_overlay(Path::new("/var/lib/burrow/mnt/web"));
        assert_eq!(
            config.options(),
            "lowerdir=/var/lib/burrow/mnt/web/lower,upperdir=/var/lib/burrow/mnt/web/upper,\
             workdir=/var/lib/burrow/mnt/web/work"
        );
        assert_eq!(config.merged_dir, PathBuf::from("/var/lib/burrow/mnt/web"));
    }
}
