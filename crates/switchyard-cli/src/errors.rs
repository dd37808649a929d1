//! Error types for the CLI runtime.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use switchyard::MuxError;
use switchyard_ws::DiscoveryError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to start the async runtime: {0}")]
    Runtime(io::Error),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error("params must be a JSON value: {0}")]
    ParseParams(serde_json::Error),
    #[error("command did not finish within {0:?}")]
    Timeout(Duration),
    #[error("screenshot data is not valid base64: {0}")]
    DecodeScreenshot(base64::DecodeError),
    #[error("the browser returned no screenshot data")]
    MissingScreenshot,
    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: Utf8PathBuf,
        source: io::Error,
    },
    #[error("failed to serialise output: {0}")]
    SerialiseOutput(serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}
