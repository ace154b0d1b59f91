//! Container log management.
//!
//! A batch container's stdout goes to `container.log` in its info
//! directory.

use std::fs::File;

use burrow_common::config::BurrowConfig;
use burrow_common::error::{BurrowError, Result};

/// Creates the info directory of `container` and truncates its log file.
///
/// # Errors
///
/// Returns an error if the directory or the file cannot be created.
pub fn create_log_file(config: &BurrowConfig, container: &str) -> Result<File> {
    let dir = config.info_dir(container);
    std::fs::create_dir_all(&dir).map_err(|e| BurrowError::io(&dir, e))?;
    let path = config.log_path(container);
    let file = File::create(&path).map_err(|e| BurrowError::io(&path, e))?;
    tracing::debug!(path = %path.display(), "container log created");
    Ok(file)
}

/// Reads container logs from disk.
///
/// Returns an empty string if the log file does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read.
pub fn read_logs(config: &BurrowConfig, container: &str) -> Result<String> {
    let path = config.log_path(container);
    if !path.exists() {
        return Ok(String::new());
    }
    std::fs::read_to_string(&path).map_err(|e| BurrowError::Io { path, source: e })
}
