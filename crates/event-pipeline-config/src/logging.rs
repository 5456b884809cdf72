//! Logging initialization.
//!
//! `RUST_LOG` always wins over the configured level. Output is compact text on
//! stderr unless JSON lines or a log file are requested.

use crate::{ConfigError, ConfigResult};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Logging setup.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name recorded in the startup line.
    pub service_name: String,
    /// Level used when `RUST_LOG` is unset.
    pub default_level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Append to this file instead of writing to stderr.
    pub log_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "event-pipeline".into(),
            default_level: "info".into(),
            json: false,
            log_path: None,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Fails if the log file cannot be opened or a subscriber is already set.
pub fn init_logging_with(config: LogConfig) -> ConfigResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = match &config.log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = Mutex::new(file);
            if config.json {
                builder.json().with_writer(writer).try_init()
            } else {
                builder.with_ansi(false).with_writer(writer).try_init()
            }
        }
        None if config.json => builder.json().with_writer(std::io::stderr).try_init(),
        None => builder.compact().with_writer(std::io::stderr).try_init(),
    };
    result.map_err(|e| ConfigError::Config(format!("logging already initialized: {e}")))?;

    tracing::debug!(
        service = %config.service_name,
        level = %config.default_level,
        json = config.json,
        "Logging initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_config() {
        let config = LogConfig::default();
        assert_eq!(config.service_name, "event-pipeline");
        assert_eq!(config.default_level, "info");
        assert!(!config.json);
        assert!(config.log_path.is_none());
    }

    #[test]
    fn test_second_init_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            json: true,
            log_path: Some(dir.path().join("logs").join("test.jsonl")),
            ..Default::default()
        };

        // Whichever test installs the global subscriber first, a second
        // install in the same process must fail.
        let _ = init_logging_with(config.clone());
        assert!(init_logging_with(config.clone()).is_err());
        assert!(config.log_path.unwrap().exists());
    }
}
