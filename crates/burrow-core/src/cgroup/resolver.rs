//! Locating cgroup hierarchies on the host.
//!
//! On a unified (v2) host every controller lives under `/sys/fs/cgroup`.
//! On a legacy (v1) host each controller has its own mount, found by
//! scanning `/proc/self/mountinfo` for the controller name among the
//! super options of a mount.

use std::fs;
use std::io::{BufRead, BufReader};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use burrow_common::constants::{CGROUP_V2_PATH, PROC_FILESYSTEMS, PROC_SELF_MOUNTINFO};
use burrow_common::error::{BurrowError, Result};

/// Index of the mount point within a mountinfo line.
const MOUNTINFO_MOUNT_POINT: usize = 4;

/// Cgroup hierarchy flavour active on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyVersion {
    /// cgroup v2, a single hierarchy for every controller.
    Unified,
    /// cgroup v1, one hierarchy per controller.
    Legacy,
}

/// Control files whose name depends on the hierarchy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFile {
    /// Hard memory limit.
    MemoryLimit,
    /// Relative CPU weight.
    CpuWeight,
    /// Maximum number of tasks.
    PidsMax,
    /// List of member processes.
    Procs,
}

impl ControlFile {
    /// Returns the file name of this control file under `version`.
    #[must_use]
    pub const fn file_name(self, version: HierarchyVersion) -> &'static str {
        match (self, version) {
            (Self::MemoryLimit, HierarchyVersion::Unified) => "memory.max",
            (Self::MemoryLimit, HierarchyVersion::Legacy) => "memory.limit_in_bytes",
            (Self::CpuWeight, HierarchyVersion::Unified) => "cpu.weight",
            (Self::CpuWeight, HierarchyVersion::Legacy) => "cpu.shares",
            (Self::PidsMax, _) => "pids.max",
            (Self::Procs, _) => "cgroup.procs",
        }
    }
}

/// Resolves per-container cgroup directories.
///
/// The probe locations are fields so the resolver can be pointed at
/// fixture files instead of the live `/proc` and `/sys`.
#[derive(Debug, Clone)]
pub struct CgroupPathResolver {
    filesystems: PathBuf,
    mountinfo: PathBuf,
    unified_root: PathBuf,
}

impl Default for CgroupPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupPathResolver {
    /// Creates a resolver probing the live kernel interfaces.
    #[must_use]
    pub fn new() -> Self {
        Self::with_paths(PROC_FILESYSTEMS, PROC_SELF_MOUNTINFO, CGROUP_V2_PATH)
    }

    /// Creates a resolver probing custom locations.
    #[must_use]
    pub fn with_paths(
        filesystems: impl Into<PathBuf>,
        mountinfo: impl Into<PathBuf>,
        unified_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            filesystems: filesystems.into(),
            mountinfo: mountinfo.into(),
            unified_root: unified_root.into(),
        }
    }

    /// Detects the hierarchy version from the filesystem-type registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read.
    pub fn detect_hierarchy_version(&self) -> Result<HierarchyVersion> {
        let registry = fs::read_to_string(&self.filesystems)
            .map_err(|e| BurrowError::io(&self.filesystems, e))?;
        let unified = registry
            .lines()
            .any(|line| line.split_whitespace().any(|field| field == "cgroup2"));
        Ok(if unified {
            HierarchyVersion::Unified
        } else {
            HierarchyVersion::Legacy
        })
    }

    /// Finds the hierarchy mount point serving `subsystem`.
    ///
    /// # Errors
    ///
    /// Returns an error if a probe file cannot be read, or if no mount
    /// carries `subsystem` on a legacy host.
    pub fn find_mount_point(&self, subsystem: &str) -> Result<PathBuf> {
        let version = self.detect_hierarchy_version()?;
        tracing::debug!(?version, subsystem, "cgroup hierarchy detected");
        if version == HierarchyVersion::Unified {
            return Ok(self.unified_root.clone());
        }

        let file =
            fs::File::open(&self.mountinfo).map_err(|e| BurrowError::io(&self.mountinfo, e))?;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| BurrowError::io(&self.mountinfo, e))?;
            if let Some(mount_point) = legacy_mount_point(&line, subsystem) {
                return Ok(PathBuf::from(mount_point));
            }
        }
        Err(BurrowError::NotFound {
            kind: "cgroup mount point",
            id: subsystem.to_string(),
        })
    }

    /// Returns the directory of `cgroup` under `subsystem` without creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy mount point cannot be found.
    pub fn cgroup_path(&self, subsystem: &str, cgroup: &str) -> Result<PathBuf> {
        Ok(self.find_mount_point(subsystem)?.join(cgroup))
    }

    /// Returns the directory of `cgroup` under `subsystem`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount point cannot be found, or if the
    /// directory cannot be inspected or created.
    pub fn resolve_cgroup_path(&self, subsystem: &str, cgroup: &str) -> Result<PathBuf> {
        let path = self.cgroup_path(subsystem, cgroup)?;
        match fs::metadata(&path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                create_group_dir(&path)?;
                tracing::info!(subsystem, path = %path.display(), "cgroup created");
            }
            Err(e) => return Err(BurrowError::io(path, e)),
        }
        Ok(path)
    }
}

/// Returns the mount point of a mountinfo line if its super options name
/// `subsystem` exactly.
fn legacy_mount_point<'a>(line: &'a str, subsystem: &str) -> Option<&'a str> {
    let fields: Vec<&str> = line.split(' ').collect();
    if fields.len() <= MOUNTINFO_MOUNT_POINT {
        return None;
    }
    let options = fields.last()?;
    options
        .split(',')
        .any(|opt| opt == subsystem)
        .then_some(fields[MOUNTINFO_MOUNT_POINT])
}

fn create_group_dir(path: &Path) -> Result<()> {
    fs::DirBuilder::new()
        .mode(0o777)
        .create(path)
        .map_err(|e| BurrowError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::fixture;

    #[test]
    fn registry_listing_cgroup2_is_unified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::unified(dir.path());
        assert_eq!(
            resolver.detect_hierarchy_version().unwrap(),
            HierarchyVersion::Unified
        );
    }

    #[test]
    fn registry_without_cgroup2_is_legacy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::legacy(dir.path(), &["memory"]);
        assert_eq!(
            resolver.detect_hierarchy_version().unwrap(),
            HierarchyVersion::Legacy
        );
    }

    #[test]
    fn unreadable_registry_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = CgroupPathResolver::with_paths(
            dir.path().join("missing"),
            dir.path().join("mountinfo"),
            dir.path(),
        );
        let err = resolver.detect_hierarchy_version().unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
    }

    #[test]
    fn unified_mount_point_is_the_fixed_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::unified(dir.path());
        assert_eq!(
            resolver.find_mount_point("memory").unwrap(),
            fixture::unified_root(dir.path())
        );
    }

    #[test]
    fn legacy_mount_point_matches_exact_option() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::legacy(dir.path(), &["memory", "cpu,cpuacct"]);
        assert_eq!(
            resolver.find_mount_point("cpu").unwrap(),
            dir.path().join("cpu,cpuacct")
        );
        assert_eq!(
            resolver.find_mount_point("memory").unwrap(),
            dir.path().join("memory")
        );
    }

    #[test]
    fn legacy_mount_point_ignores_prefix_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::legacy(dir.path(), &["cpuacct"]);
        let err = resolver.find_mount_point("cpu").unwrap_err();
        assert!(matches!(
            err,
            BurrowError::NotFound {
                kind: "cgroup mount point",
                ..
            }
        ));
    }

    #[test]
    fn resolving_twice_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::unified(dir.path());
        let first = resolver.resolve_cgroup_path("memory", "web").unwrap();
        assert!(first.is_dir());
        let second = resolver.resolve_cgroup_path("memory", "web").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn cgroup_path_does_not_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = fixture::unified(dir.path());
        let path = resolver.cgroup_path("memory", "web").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn control_file_names_follow_hierarchy() {
        use HierarchyVersion::{Legacy, Unified};
        assert_eq!(ControlFile::MemoryLimit.file_name(Unified), "memory.max");
        assert_eq!(
            ControlFile::MemoryLimit.file_name(Legacy),
            "memory.limit_in_bytes"
        );
        assert_eq!(ControlFile::CpuWeight.file_name(Legacy), "cpu.shares");
        assert_eq!(ControlFile::Procs.file_name(Legacy), "cgroup.procs");
    }

    #[test]
    fn short_mountinfo_lines_are_skipped() {
        assert_eq!(legacy_mount_point("garbage memory", "memory"), None);
    }
}
