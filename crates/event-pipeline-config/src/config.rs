//! Configuration management for the event pipeline.

use crate::{ConfigError, ConfigResult, Paths};
use event_pipeline::{
    event_types, LoggerConfig, RetryPolicy, SenderConfig, DEFAULT_MAX_RETRIES, DEFAULT_TTL_SECONDS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default collector URL (can be overridden at compile time via
/// EVENT_PIPELINE_DEFAULT_COLLECTOR_URL).
pub const DEFAULT_COLLECTOR_URL: &str = match option_env!("EVENT_PIPELINE_DEFAULT_COLLECTOR_URL") {
    Some(url) => url,
    None => event_pipeline::DEFAULT_COLLECTOR_URL,
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DRAIN_BUDGET_SECS: u64 = 30;

const ENV_LOG_LEVEL: &str = "EVENT_PIPELINE_LOG_LEVEL";
const ENV_COLLECTOR_URL: &str = "EVENT_PIPELINE_COLLECTOR_URL";
const ENV_AUTH_TOKEN: &str = "EVENT_PIPELINE_AUTH_TOKEN";

/// Pipeline configuration.
///
/// Missing fields in a config file take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Base URL of the collector; events are posted to `{collector_url}/event`.
    pub collector_url: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// Delivery attempts a stored event gets before it is discarded.
    pub max_retries: u32,
    /// Time-to-live stamped on new events.
    pub ttl_seconds: i64,
    /// Time budget for one background drain.
    pub drain_budget_secs: u64,
    /// Event types dropped instead of queued when the first send fails.
    pub discardable_event_types: Vec<String>,
    /// Bearer token for the collector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Override for the pending-event database location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            drain_budget_secs: DEFAULT_DRAIN_BUDGET_SECS,
            discardable_event_types: vec![event_types::SESSION_PING.to_string()],
            auth_token: None,
            database_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `<base>/config.json` if present, then apply
    /// environment overrides and validate.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).and_then(non_empty_env);

        if let Some(log_level) = var(ENV_LOG_LEVEL) {
            self.log_level = log_level;
        }
        if let Some(url) = var(ENV_COLLECTOR_URL) {
            self.collector_url = url;
        }
        if let Some(token) = var(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token);
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        self.collector_url()?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if self.ttl_seconds <= 0 {
            return Err(ConfigError::Config(
                "ttl_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the collector URL as a parsed URL.
    pub fn collector_url(&self) -> ConfigResult<Url> {
        let url = Url::parse(&self.collector_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Config(format!(
                "collector_url must be http or https, got {other}"
            ))),
        }
    }

    /// Resolve the database location, preferring the configured override.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }

    pub fn drain_budget(&self) -> Duration {
        Duration::from_secs(self.drain_budget_secs)
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            collector_url: self.collector_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            auth_token: self.auth_token.clone(),
            ..Default::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries)
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            ttl_seconds: self.ttl_seconds,
            discardable_event_types: self.discardable_event_types.iter().cloned().collect(),
        }
    }
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
