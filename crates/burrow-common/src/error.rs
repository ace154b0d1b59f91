//! Unified error types for the Burrow workspace.
//!
//! Every variant carries the path, subsystem, or container involved so the
//! failure can be reported without further context from the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A mount, unmount, or root-swap syscall failed.
    #[error("{operation} failed at {target}: {source}")]
    Mount {
        /// Mount target the operation acted on.
        target: PathBuf,
        /// Short name of the failed operation.
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Moving a process into a cgroup failed.
    #[error("failed to attach pid {pid} via {path}: {source}")]
    Attach {
        /// Process that could not be attached.
        pid: u32,
        /// Process-list control file that was written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing a cgroup limit file failed.
    #[error("failed to set {subsystem} limit via {path}: {source}")]
    ResourceLimit {
        /// Subsystem whose limit could not be written.
        subsystem: &'static str,
        /// Limit control file that was written.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The target command could not be resolved or executed.
    #[error("cannot execute {command}: {message}")]
    Exec {
        /// Command that failed.
        command: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Wraps an [`std::io::Error`] with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;
