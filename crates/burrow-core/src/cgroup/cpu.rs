//! CPU resource control.
//!
//! Writes the relative weight into `cpu.weight` (unified) or `cpu.shares`
//! (legacy). The value is passed through unchanged, so callers must use the
//! scale of the active hierarchy: 1 to 10000 for `cpu.weight`, 2 and up for
//! `cpu.shares`.

use std::sync::Arc;

use burrow_common::error::Result;
use burrow_common::types::ResourceConfig;

use super::{CgroupPathResolver, ControlFile, Subsystem, write_limit};

/// The `cpu` controller.
#[derive(Debug, Clone)]
pub struct CpuSubsystem {
    resolver: Arc<CgroupPathResolver>,
}

impl CpuSubsystem {
    /// Creates the controller on top of `resolver`.
    #[must_use]
    pub const fn new(resolver: Arc<CgroupPathResolver>) -> Self {
        Self { resolver }
    }
}

impl Subsystem for CpuSubsystem {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn resolver(&self) -> &CgroupPathResolver {
        &self.resolver
    }

    fn set(&self, cgroup: &str, res: &ResourceConfig) -> Result<()> {
        let Some(shares) = res.cpu_shares.as_deref() else {
            return Ok(());
        };
        write_limit(self, ControlFile::CpuWeight, cgroup, shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::fixture;

    #[test]
    fn set_without_shares_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cpu = CpuSubsystem::new(Arc::new(fixture::unified(dir.path())));

        cpu.set("web", &ResourceConfig::default()).unwrap();
        assert!(!fixture::unified_root(dir.path()).join("web").exists());
    }

    #[test]
    fn set_writes_cpu_shares_on_legacy_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cpu = CpuSubsystem::new(Arc::new(fixture::legacy(dir.path(), &["cpu,cpuacct"])));
        let res = ResourceConfig {
            cpu_shares: Some("256".into()),
            ..ResourceConfig::default()
        };

        cpu.set("web", &res).unwrap();

        let file = dir.path().join("cpu,cpuacct/web/cpu.shares");
        assert_eq!(std::fs::read_to_string(file).unwrap(), "256");
    }
}
