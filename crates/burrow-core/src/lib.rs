//! # burrow-core
//!
//! Low-level Linux isolation primitives for the Burrow runtime.
//!
//! This crate provides safe abstractions over:
//! - **Cgroups**: version-aware hierarchy resolution and pluggable
//!   resource subsystems (memory, CPU, PIDs).
//! - **Filesystem**: `OverlayFS` layering, bind/proc/dev mounts, and
//!   `pivot_root`.
//! - **Namespaces**: selection of the namespaces a container is cloned into.
//!
//! The filesystem and namespace modules only exist on Linux; the cgroup
//! module is plain file I/O and builds everywhere.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
#[cfg(target_os = "linux")]
pub mod filesystem;
#[cfg(target_os = "linux")]
pub mod namespace;
