//! Cgroup resource management.
//!
//! Resource controllers implement [`Subsystem`] on top of a shared
//! [`CgroupPathResolver`], which hides the difference between the unified
//! (v2) and legacy (v1) hierarchies. A [`SubsystemRegistry`] holds the
//! available controllers and [`CgroupManager`] fans operations out to all
//! of them for one named cgroup.

pub mod cpu;
pub mod memory;
pub mod pids;
pub mod resolver;

use std::fs;
use std::sync::Arc;

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ResourceConfig;

pub use cpu::CpuSubsystem;
pub use memory::MemorySubsystem;
pub use pids::PidsSubsystem;
pub use resolver::{CgroupPathResolver, ControlFile, HierarchyVersion};

/// A cgroup resource controller.
///
/// Implementors only describe how limits are written; attaching processes
/// and removing the group are shared across controllers.
pub trait Subsystem: Send + Sync {
    /// Controller name as it appears in the kernel (`"memory"`, `"cpu"`).
    fn name(&self) -> &'static str;

    /// Resolver used to locate this controller's hierarchy.
    fn resolver(&self) -> &CgroupPathResolver;

    /// Writes the limits relevant to this controller into `cgroup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup cannot be resolved or the limit file
    /// cannot be written.
    fn set(&self, cgroup: &str, res: &ResourceConfig) -> Result<()>;

    /// Moves process `pid` into `cgroup`.
    ///
    /// Limits are not retroactive: call this before the process has
    /// consumed what it is being limited on.
    ///
    /// # Errors
    ///
    /// Returns an error if the cgroup cannot be resolved or the process
    /// list cannot be written.
    fn apply(&self, cgroup: &str, pid: u32) -> Result<()> {
        let resolver = self.resolver();
        let path = resolver.resolve_cgroup_path(self.name(), cgroup)?;
        let version = resolver.detect_hierarchy_version()?;
        let procs = path.join(ControlFile::Procs.file_name(version));
        fs::write(&procs, pid.to_string()).map_err(|e| BurrowError::Attach {
            pid,
            path: procs.clone(),
            source: e,
        })?;
        tracing::debug!(subsystem = self.name(), cgroup, pid, "added process to cgroup");
        Ok(())
    }

    /// Deletes `cgroup`. A group that is already gone is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the hierarchy cannot be located or the group
    /// directory cannot be removed.
    fn remove(&self, cgroup: &str) -> Result<()> {
        let path = self.resolver().cgroup_path(self.name(), cgroup)?;
        // A live cgroup directory only goes away through rmdir(2); its
        // control files cannot be unlinked.
        let removed = match fs::remove_dir(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::DirectoryNotEmpty => {
                fs::remove_dir_all(&path)
            }
            Err(e) => Err(e),
        };
        removed.map_err(|e| BurrowError::io(&path, e))?;
        tracing::info!(subsystem = self.name(), path = %path.display(), "cgroup removed");
        Ok(())
    }
}

/// Writes `value` verbatim into `file` of `cgroup` for `subsystem`.
pub(crate) fn write_limit(
    subsystem: &dyn Subsystem,
    file: ControlFile,
    cgroup: &str,
    value: &str,
) -> Result<()> {
    let resolver = subsystem.resolver();
    let path = resolver.resolve_cgroup_path(subsystem.name(), cgroup)?;
    let version = resolver.detect_hierarchy_version()?;
    let limit_file = path.join(file.file_name(version));
    fs::write(&limit_file, value).map_err(|e| BurrowError::ResourceLimit {
        subsystem: subsystem.name(),
        path: limit_file.clone(),
        source: e,
    })?;
    tracing::info!(
        subsystem = subsystem.name(),
        file = %limit_file.display(),
        value,
        "cgroup limit set"
    );
    Ok(())
}

/// The set of resource controllers known to the runtime.
#[derive(Default)]
pub struct SubsystemRegistry {
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl std::fmt::Debug for SubsystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.subsystems.iter().map(|s| s.name()))
            .finish()
    }
}

impl SubsystemRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the memory, CPU, and PIDs controllers.
    #[must_use]
    pub fn with_defaults(resolver: &Arc<CgroupPathResolver>) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MemorySubsystem::new(Arc::clone(resolver))));
        registry.register(Box::new(CpuSubsystem::new(Arc::clone(resolver))));
        registry.register(Box::new(PidsSubsystem::new(Arc::clone(resolver))));
        registry
    }

    /// Adds a controller.
    pub fn register(&mut self, subsystem: Box<dyn Subsystem>) {
        self.subsystems.push(subsystem);
    }

    /// Looks up a controller by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Subsystem> {
        self.subsystems
            .iter()
            .find(|s| s.name() == name)
            .map(|s| &**s)
    }

    /// Iterates over the registered controllers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Subsystem> {
        self.subsystems.iter().map(|s| &**s)
    }
}

/// Handle to one named cgroup across every registered controller.
#[derive(Debug)]
pub struct CgroupManager {
    name: String,
    registry: SubsystemRegistry,
}

impl CgroupManager {
    /// Creates a manager for the cgroup `name`.
    ///
    /// Nothing is created on disk until limits are set or a process is applied.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: SubsystemRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    /// Returns the cgroup name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes `res` through every controller.
    ///
    /// # Errors
    ///
    /// Returns the first controller error.
    pub fn set(&self, res: &ResourceConfig) -> Result<()> {
        for subsystem in self.registry.iter() {
            subsystem.set(&self.name, res)?;
        }
        Ok(())
    }

    /// Moves `pid` into the cgroup of every controller.
    ///
    /// # Errors
    ///
    /// Returns the first controller error.
    pub fn apply(&self, pid: u32) -> Result<()> {
        for subsystem in self.registry.iter() {
            subsystem.apply(&self.name, pid)?;
        }
        Ok(())
    }

    /// Removes the cgroup from every controller.
    ///
    /// # Errors
    ///
    /// Returns the first controller error.
    pub fn destroy(&self) -> Result<()> {
        for subsystem in self.registry.iter() {
            subsystem.remove(&self.name)?;
        }
        Ok(())
    }
}
