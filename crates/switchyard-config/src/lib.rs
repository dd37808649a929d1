//! Shared configuration for the switchyard command-line client.
//!
//! Values are layered with `ortho_config`: built-in defaults, then a TOML
//! file (`--config-path`), then `SWITCHYARD_*` environment variables, then
//! command-line flags.

mod defaults;
mod logging;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_DISCOVERY_URL, DEFAULT_LOG_FILTER,
    default_call_timeout_secs, default_discovery_url, default_log_filter,
    default_log_filter_string, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Flags consumed by the configuration loader rather than the command parser.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--discovery-url",
    "--call-timeout-secs",
    "--log-filter",
    "--log-format",
];

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SWITCHYARD")]
pub struct Config {
    /// DevTools listing endpoint used to discover targets.
    #[serde(default = "default_discovery_url")]
    #[ortho_config(default = default_discovery_url())]
    pub discovery_url: String,
    /// Upper bound on each command, in seconds.
    #[serde(default = "default_call_timeout_secs")]
    #[ortho_config(default = default_call_timeout_secs())]
    pub call_timeout_secs: u64,
    /// `tracing` filter directive applied to log output.
    #[serde(default = "default_log_filter_string")]
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format of log lines.
    #[serde(default = "default_log_format")]
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            call_timeout_secs: default_call_timeout_secs(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// DevTools listing endpoint.
    #[must_use]
    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    /// Upper bound on each command.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// `tracing` filter directive.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
