//! Per-container info record.
//!
//! Each launched container gets a JSON record in its info directory so
//! the pid and command survive the launching process.

use std::path::PathBuf;

use burrow_common::config::BurrowConfig;
use burrow_common::constants::CONTAINER_RECORD_FILE;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{ContainerState, Volume};
use serde::{Deserialize, Serialize};

/// Persistent record of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Container name.
    pub name: String,
    /// Host pid of the container's init process, once started.
    pub pid: Option<u32>,
    /// Command line handed to the container.
    pub command: Vec<String>,
    /// Current lifecycle state.
    pub state: ContainerState,
    /// Volume bound into the container.
    pub volume: Option<Volume>,
    /// ISO-8601 timestamp of creation.
    pub created_at: String,
}

impl ContainerRecord {
    /// Creates a record for a container that has not started yet.
    #[must_use]
    pub fn new(name: impl Into<String>, command: Vec<String>, volume: Option<Volume>) -> Self {
        Self {
            name: name.into(),
            pid: None,
            command,
            state: ContainerState::Created,
            volume,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn record_path(config: &BurrowConfig, name: &str) -> PathBuf {
    config.info_dir(name).join(CONTAINER_RECORD_FILE)
}

/// Writes `record` into its container's info directory.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn save_record(config: &BurrowConfig, record: &ContainerRecord) -> Result<()> {
    let dir = config.info_dir(&record.name);
    std::fs::create_dir_all(&dir).map_err(|e| BurrowError::io(&dir, e))?;
    let path = record_path(config, &record.name);
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json).map_err(|e| BurrowError::io(&path, e))?;
    tracing::debug!(path = %path.display(), state = %record.state, "container record saved");
    Ok(())
}

/// Loads the record of container `name`.
///
/// # Errors
///
/// Returns [`BurrowError::NotFound`] if there is no record, or an error if
/// it cannot be read or parsed.
pub fn load_record(config: &BurrowConfig, name: &str) -> Result<ContainerRecord> {
    let path = record_path(config, name);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BurrowError::NotFound {
                kind: "container",
                id: name.to_string(),
            });
        }
        Err(e) => return Err(BurrowError::io(path, e)),
    };
    Ok(serde_json::from_str(&content)?)
}

/// Deletes the info directory of container `name`, log included.
///
/// # Errors
///
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_record(config: &BurrowConfig, name: &str) -> Result<()> {
    let dir = config.info_dir(name);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BurrowError::io(dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> BurrowConfig {
        BurrowConfig {
            info_root: dir.to_path_buf(),
            ..BurrowConfig::default()
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        let mut record = ContainerRecord::new(
            "web",
            vec!["top".into()],
            Volume::parse("/srv:/data").unwrap(),
        );
        save_record(&config, &record).unwrap();

        record.pid = Some(4242);
        record.state = ContainerState::Running;
        save_record(&config, &record).unwrap();

        let loaded = load_record(&config, "web").unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn missing_record_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_record(&config_in(dir.path()), "ghost").unwrap_err();
        assert!(matches!(err, BurrowError::NotFound { kind: "container", .. }));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_in(dir.path());
        save_record(&config, &ContainerRecord::new("web", vec![], None)).unwrap();

        remove_record(&config, "web").unwrap();
        remove_record(&config, "web").unwrap();
        assert!(!dir.path().join("web").exists());
    }
}
