//! Configuration, paths, and logging setup for the event pipeline.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_COLLECTOR_URL, DEFAULT_LOG_LEVEL};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging_with, LogConfig};
pub use paths::Paths;
