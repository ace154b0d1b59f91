//! Per-container filesystem workspace.
//!
//! A workspace combines the externally provisioned read-only base image
//! with a writable layer and an overlay work directory, both owned by the
//! container, and mounts the merged view at the container's mount target.
//! An optional volume is bound from the host into the merged view.

use std::path::{Path, PathBuf};

use burrow_common::config::BurrowConfig;
use burrow_common::constants::{WORK_DIR, WRITE_LAYER_DIR};
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerName, Volume};
use burrow_core::filesystem::mount::{bind_mount, detach_unmount_if_mounted};
use burrow_core::filesystem::overlayfs::{OverlayConfig, mount_overlay};

/// Filesystem locations belonging to one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerWorkspace {
    /// Container the workspace belongs to.
    pub container_name: ContainerName,
    /// Read-only base image, owned by whoever provisioned it.
    pub base_image: PathBuf,
    /// Writable upper layer.
    pub write_layer: PathBuf,
    /// Overlay work directory, distinct from the upper layer.
    pub work_dir: PathBuf,
    /// Where the merged root is mounted.
    pub mount_target: PathBuf,
    /// Host directory bound into the container, if any.
    pub volume: Option<Volume>,
}

impl ContainerWorkspace {
    /// Lays out the workspace of `name` according to `config`.
    #[must_use]
    pub fn new(
        config: &BurrowConfig,
        name: &ContainerName,
        base_image: impl Into<PathBuf>,
        volume: Option<Volume>,
    ) -> Self {
        Self {
            container_name: name.clone(),
            base_image: base_image.into(),
            write_layer: config.root_dir.join(WRITE_LAYER_DIR).join(name.as_str()),
            work_dir: config.root_dir.join(WORK_DIR).join(name.as_str()),
            mount_target: config.mount_root.join(name.as_str()),
            volume,
        }
    }

    /// Overlay combining the base image with the writable layer.
    #[must_use]
    pub fn overlay(&self) -> OverlayConfig {
        OverlayConfig {
            lower_dirs: vec![self.base_image.clone()],
            upper_dir: self.write_layer.clone(),
            work_dir: self.work_dir.clone(),
            merged_dir: self.mount_target.clone(),
        }
    }

    /// Builds and mounts the workspace.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that fails. Stages already
    /// completed are left in place.
    pub fn build(&self) -> Result<()> {
        let stage = LayeredRootBuilder::new(self).build()?;
        tracing::info!(container = %self.container_name, ?stage, "workspace ready");
        Ok(())
    }

    /// Unmounts and deletes everything the workspace created.
    ///
    /// The base image and the host side of the volume are never touched.
    /// Paths that were never mounted or created are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an unmount or a removal fails.
    pub fn teardown(&self) -> Result<()> {
        if let Some(volume) = &self.volume {
            detach_unmount_if_mounted(&volume.target_under(&self.mount_target))?;
        }
        detach_unmount_if_mounted(&self.mount_target)?;

        for layer in [&self.write_layer, &self.work_dir] {
            match std::fs::remove_dir_all(layer) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BurrowError::io(layer, e)),
            }
        }
        // Plain rmdir: anything still mounted or left below the target
        // makes this fail instead of deleting through it.
        match std::fs::remove_dir(&self.mount_target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BurrowError::io(&self.mount_target, e)),
        }
        tracing::info!(container = %self.container_name, "workspace removed");
        Ok(())
    }
}

/// Progress of a [`LayeredRootBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
    /// Nothing checked or created yet.
    Uncreated,
    /// The base image exists.
    BaseVerified,
    /// Writable layer and work directory exist.
    WriteLayerReady,
    /// The overlay is mounted at the mount target.
    Mounted,
    /// The volume is bound into the merged root.
    VolumeBound,
    /// The workspace can be swapped into.
    Ready,
}

/// Assembles a [`ContainerWorkspace`] one gated stage at a time.
///
/// Each stage requires the previous one. A failure leaves the completed
/// stages in place; cleaning up is [`ContainerWorkspace::teardown`]'s job.
#[derive(Debug)]
pub struct LayeredRootBuilder<'a> {
    workspace: &'a ContainerWorkspace,
    stage: BuildStage,
}

impl<'a> LayeredRootBuilder<'a> {
    /// Starts a builder for `workspace`.
    #[must_use]
    pub const fn new(workspace: &'a ContainerWorkspace) -> Self {
        Self {
            workspace,
            stage: BuildStage::Uncreated,
        }
    }

    /// Returns the last completed stage.
    #[must_use]
    pub const fn stage(&self) -> BuildStage {
        self.stage
    }

    /// Runs every remaining stage.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing stage.
    pub fn build(mut self) -> Result<BuildStage> {
        self.verify_base_image()?;
        self.ensure_write_layer()?;
        self.mount_layered()?;
        self.bind_volume()?;
        self.advance(BuildStage::VolumeBound, BuildStage::Ready)?;
        Ok(self.stage)
    }

    /// Checks that the base image exists.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if the base image is missing.
    pub fn verify_base_image(&mut self) -> Result<()> {
        self.require(BuildStage::Uncreated)?;
        verify_base_image(&self.workspace.base_image)?;
        self.advance(BuildStage::Uncreated, BuildStage::BaseVerified)
    }

    /// Creates the writable layer and the work directory.
    ///
    /// # Errors
    ///
    /// Returns an error if either directory cannot be created.
    pub fn ensure_write_layer(&mut self) -> Result<()> {
        self.require(BuildStage::BaseVerified)?;
        for dir in [&self.workspace.write_layer, &self.workspace.work_dir] {
            std::fs::create_dir_all(dir).map_err(|e| BurrowError::io(dir, e))?;
        }
        tracing::debug!(
            write_layer = %self.workspace.write_layer.display(),
            work_dir = %self.workspace.work_dir.display(),
            "write layer ready"
        );
        self.advance(BuildStage::BaseVerified, BuildStage::WriteLayerReady)
    }

    /// Mounts the overlay at the mount target.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount target cannot be created or the
    /// overlay mount fails.
    pub fn mount_layered(&mut self) -> Result<()> {
        self.require(BuildStage::WriteLayerReady)?;
        mount_overlay(&self.workspace.overlay())?;
        self.advance(BuildStage::WriteLayerReady, BuildStage::Mounted)
    }

    /// Binds the volume into the merged root; a no-op without a volume.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume directory cannot be created or the
    /// bind mount fails.
    pub fn bind_volume(&mut self) -> Result<()> {
        self.require(BuildStage::Mounted)?;
        if let Some(volume) = &self.workspace.volume {
            let target = prepare_volume(volume, &self.workspace.mount_target)?;
            bind_mount(&volume.host_path, &target)?;
        }
        self.advance(BuildStage::Mounted, BuildStage::VolumeBound)
    }

    fn require(&self, expected: BuildStage) -> Result<()> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(BurrowError::Config {
                message: format!(
                    "workspace of {} is at stage {:?}, expected {expected:?}",
                    self.workspace.container_name, self.stage
                ),
            })
        }
    }

    fn advance(&mut self, from: BuildStage, to: BuildStage) -> Result<()> {
        self.require(from)?;
        self.stage = to;
        Ok(())
    }
}

/// Checks that an externally provisioned base image exists.
///
/// Never creates, extracts, or fetches anything.
///
/// # Errors
///
/// Returns [`BurrowError::NotFound`] if `path` does not exist.
pub fn verify_base_image(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BurrowError::NotFound {
            kind: "base image",
            id: path.display().to_string(),
        }),
        Err(e) => Err(BurrowError::io(path, e)),
    }
}

/// Creates both ends of a volume and returns the bind target.
///
/// The host directory is created if missing; the container directory is
/// created under `mount_target`.
///
/// # Errors
///
/// Returns [`BurrowError::Config`] if the container path could leave the
/// mount target, or an error if either directory cannot be created.
pub fn prepare_volume(volume: &Volume, mount_target: &Path) -> Result<PathBuf> {
    if !volume.stays_inside_root() {
        return Err(BurrowError::Config {
            message: format!("volume {volume} escapes the container root"),
        });
    }
    std::fs::create_dir_all(&volume.host_path).map_err(|e| BurrowError::io(&volume.host_path, e))?;
    let target = volume.target_under(mount_target);
    std::fs::create_dir_all(&target).map_err(|e| BurrowError::io(&target, e))?;
    Ok(target)
}
