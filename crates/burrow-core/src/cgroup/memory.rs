//! Memory resource control.
//!
//! Writes the hard limit into `memory.max` on a unified hierarchy and
//! `memory.limit_in_bytes` on a legacy one.

use std::sync::Arc;

use burrow_common::error::Result;
use burrow_common::types::ResourceConfig;

use super::{CgroupPathResolver, ControlFile, Subsystem, write_limit};

/// The `memory` controller.
#[derive(Debug, Clone)]
pub struct MemorySubsystem {
    resolver: Arc<CgroupPathResolver>,
}

impl MemorySubsystem {
    /// Creates the controller on top of `resolver`.
    #[must_use]
    pub const fn new(resolver: Arc<CgroupPathResolver>) -> Self {
        Self { resolver }
    }
}

impl Subsystem for MemorySubsystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn resolver(&self) -> &CgroupPathResolver {
        &self.resolver
    }

    fn set(&self, cgroup: &str, res: &ResourceConfig) -> Result<()> {
        let Some(limit) = res.memory_limit.as_deref() else {
            return Ok(());
        };
        write_limit(self, ControlFile::MemoryLimit, cgroup, limit)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use burrow_common::error::BurrowError;

    use super::*;
    use crate::cgroup::fixture;

    fn limit(value: &str) -> ResourceConfig {
        ResourceConfig {
            memory_limit: Some(value.into()),
            ..ResourceConfig::default()
        }
    }

    #[test]
    fn set_writes_limit_verbatim_on_unified_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::unified(dir.path())));

        memory.set("web", &limit("100m")).unwrap();

        let file = fixture::unified_root(dir.path()).join("web/memory.max");
        assert_eq!(fs::read_to_string(file).unwrap(), "100m");
    }

    #[test]
    fn set_uses_legacy_limit_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::legacy(dir.path(), &["memory"])));

        memory.set("web", &limit("268435456")).unwrap();

        let file = dir.path().join("memory/web/memory.limit_in_bytes");
        assert_eq!(fs::read_to_string(file).unwrap(), "268435456");
    }

    #[test]
    fn apply_writes_pid_into_procs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::unified(dir.path())));

        memory.apply("web", 31337).unwrap();

        let procs = fixture::unified_root(dir.path()).join("web/cgroup.procs");
        assert!(fs::read_to_string(procs).unwrap().contains("31337"));
    }

    #[test]
    fn remove_of_absent_group_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::unified(dir.path())));

        memory.set("web", &limit("100m")).unwrap();
        memory.remove("web").unwrap();
        memory.remove("web").unwrap();
        assert!(!fixture::unified_root(dir.path()).join("web").exists());
    }

    #[test]
    fn unwritable_limit_file_is_resource_limit_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::unified(dir.path())));
        // A directory in place of the control file makes the write fail.
        let group = fixture::unified_root(dir.path()).join("web");
        fs::create_dir_all(group.join("memory.max")).unwrap();

        let err = memory.set("web", &limit("100m")).unwrap_err();
        assert!(matches!(
            err,
            BurrowError::ResourceLimit {
                subsystem: "memory",
                ..
            }
        ));
    }

    #[test]
    fn apply_to_unwritable_procs_is_attach_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::unified(dir.path())));
        let group = fixture::unified_root(dir.path()).join("web");
        fs::create_dir_all(group.join("cgroup.procs")).unwrap();

        let err = memory.apply("web", 1).unwrap_err();
        assert!(matches!(err, BurrowError::Attach { pid: 1, .. }));
    }

    #[test]
    fn missing_legacy_hierarchy_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let memory = MemorySubsystem::new(Arc::new(fixture::legacy(dir.path(), &["pids"])));

        let err = memory.set("web", &limit("100m")).unwrap_err();
        assert!(matches!(err, BurrowError::NotFound { .. }));
    }
}
