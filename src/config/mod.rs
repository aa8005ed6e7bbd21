//! Queue options and process configuration.
//!
//! [`QueueOptions`] is the per-queue option set passed at creation time.
//! [`Config`] is what the `sqliteq` binary loads from the environment once
//! at startup; it fails fast if required vars are missing.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Options recognized when creating a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueOptions {
    /// Delete acknowledged items (`true`, the default) or keep them with
    /// status `completed`.
    pub remove_on_complete: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: true,
        }
    }
}

impl QueueOptions {
    pub fn remove_on_complete(mut self, remove: bool) -> Self {
        self.remove_on_complete = remove;
        self
    }

    /// Parse options from a TOML table, e.g. `remove_on_complete = false`.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("invalid queue options: {e}")))
    }
}

#[derive(Debug)]
pub struct Config {
    /// SQLite database path, or `:memory:`.
    pub database: String,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub queue_options: QueueOptions,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut queue_options = QueueOptions::default();
        if let Ok(raw) = std::env::var("SQLITEQ_REMOVE_ON_COMPLETE") {
            queue_options.remove_on_complete = parse_bool("SQLITEQ_REMOVE_ON_COMPLETE", &raw)?;
        }

        Ok(Self {
            database: required_var("SQLITEQ_DATABASE")?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue_options,
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{name}: expected a boolean, got {other:?}"))),
    }
}
