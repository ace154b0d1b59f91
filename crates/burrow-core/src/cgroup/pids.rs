//! Process-count control via `pids.max`.

use std::sync::Arc;

use burrow_common::error::Result;
use burrow_common::types::ResourceConfig;

use super::{CgroupPathResolver, ControlFile, Subsystem, write_limit};

/// The `pids` controller.
#[derive(Debug, Clone)]
pub struct PidsSubsystem {
    resolver: Arc<CgroupPathResolver>,
}

impl PidsSubsystem {
    /// Creates the controller on top of `resolver`.
    #[must_use]
    pub const fn new(resolver: Arc<CgroupPathResolver>) -> Self {
        Self { resolver }
    }
}

impl Subsystem for PidsSubsystem {
    fn name(&self) -> &'static str {
        "pids"
    }

    fn resolver(&self) -> &CgroupPathResolver {
        &self.resolver
    }

    fn set(&self, cgroup: &str, res: &ResourceConfig) -> Result<()> {
        let Some(max) = res.pids_max.as_deref() else {
            return Ok(());
        };
        write_limit(self, ControlFile::PidsMax, cgroup, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::fixture;

    #[test]
    fn set_writes_pids_max() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pids = PidsSubsystem::new(Arc::new(fixture::unified(dir.path())));
        let res = ResourceConfig {
            pids_max: Some("max".into()),
            ..ResourceConfig::default()
        };

        pids.set("web", &res).unwrap();

        let file = fixture::unified_root(dir.path()).join("web/pids.max");
        assert_eq!(std::fs::read_to_string(file).unwrap(), "max");
    }
}
