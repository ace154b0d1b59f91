//! Container launch and initialization for the Burrow runtime.
//!
//! The launcher side ([`launcher`], [`process`], [`workspace`]) runs in the
//! invoking process; [`init`] runs as PID 1 inside the new namespaces.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(target_os = "linux")]
pub mod handoff;
#[cfg(target_os = "linux")]
pub mod init;
#[cfg(target_os = "linux")]
pub mod launcher;
pub mod logs;
#[cfg(target_os = "linux")]
pub mod process;
pub mod state;
#[cfg(target_os = "linux")]
pub mod workspace;
