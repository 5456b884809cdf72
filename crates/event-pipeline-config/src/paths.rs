//! File system paths for the event pipeline.

use crate::{ConfigError, ConfigResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".event-pipeline";
/// SQLite database holding pending events.
const DATABASE_FILE_NAME: &str = "events.sqlite";
/// Stable device identifier generated on first use.
const DEVICE_ID_FILE_NAME: &str = "device-id";

/// Manages file system paths for the pipeline.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.event-pipeline)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.event-pipeline`.
    pub fn new() -> ConfigResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.event-pipeline).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.event-pipeline/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the pending-event database path (~/.event-pipeline/events.sqlite).
    pub fn database_file(&self) -> PathBuf {
        self.base_dir.join(DATABASE_FILE_NAME)
    }

    /// Get the device id file path (~/.event-pipeline/device-id).
    pub fn device_id_file(&self) -> PathBuf {
        self.base_dir.join(DEVICE_ID_FILE_NAME)
    }

    /// Get the logs directory (~/.event-pipeline/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSON-lines log file path (~/.event-pipeline/logs/eventctl.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("eventctl.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_new_uses_home_dir() {
        let paths = Paths::new().unwrap();
        assert!(paths.base_dir().ends_with(".event-pipeline"));
    }

    #[test]
    fn test_paths_layout() {
        let paths = Paths::with_base_dir(PathBuf::from("/tmp/ep-test"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/ep-test/config.json"));
        assert_eq!(
            paths.database_file(),
            PathBuf::from("/tmp/ep-test/events.sqlite")
        );
        assert_eq!(paths.device_id_file(), PathBuf::from("/tmp/ep-test/device-id"));
        assert_eq!(
            paths.log_file(),
            PathBuf::from("/tmp/ep-test/logs/eventctl.jsonl")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_tree() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("nested"));

        paths.ensure_dirs().unwrap();
        assert!(paths.base_dir().is_dir());
        assert!(paths.logs_dir().is_dir());

        // Idempotent
        paths.ensure_dirs().unwrap();
    }
}
