//! Diagnostic logging for the CLI.
//!
//! Command results own stdout, so every log line goes to stderr. A
//! [`LogPlan`] resolves the configured filter and format; a malformed filter
//! fails there, before the global subscriber is touched.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::{self, time::UtcTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use switchyard_config::{Config, LogFormat};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured log filter expression did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another subscriber already owns the process.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Resolved logging settings for one CLI process.
#[derive(Debug)]
pub struct LogPlan {
    filter: EnvFilter,
    format: LogFormat,
    ansi: bool,
}

impl LogPlan {
    /// Resolves the filter and format carried by `config`.
    ///
    /// Escape codes are only emitted when `stderr` is a terminal.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Filter`] when the filter does not parse.
    pub fn from_config(config: &Config) -> Result<Self, TelemetryError> {
        Self::resolve(config, io::stderr().is_terminal())
    }

    fn resolve(config: &Config, ansi: bool) -> Result<Self, TelemetryError> {
        let filter = EnvFilter::try_new(config.log_filter())
            .map_err(|error| TelemetryError::Filter(error.to_string()))?;
        Ok(Self {
            filter,
            format: config.log_format(),
            ansi,
        })
    }

    /// Output format the plan will install.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }

    /// Whether log lines carry colour escape codes.
    #[must_use]
    pub const fn ansi(&self) -> bool {
        self.ansi
    }

    fn stderr_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .with_ansi(self.ansi)
            .with_timer(UtcTime::rfc_3339());
        match self.format {
            LogFormat::Json => layer.json().flatten_event(true).boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }

    /// Installs the plan as the process-wide subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Subscriber`] when a subscriber is already
    /// installed.
    pub fn install(self) -> Result<(), TelemetryError> {
        let layer = self.stderr_layer().with_filter(self.filter);
        tracing::subscriber::set_global_default(Registry::default().with(layer))
            .map_err(TelemetryError::Subscriber)
    }
}

/// Installs the global subscriber described by `config` on first use.
///
/// The first successful call wins; later calls are no-ops.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter does not parse or the
/// subscriber cannot be installed.
pub fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED
        .get_or_try_init(|| LogPlan::from_config(config)?.install())
        .map(|_| ())
}
