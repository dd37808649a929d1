//! Command execution against a DevTools endpoint.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;
use switchyard::{CancellationToken, Multiplexer};
use switchyard_config::Config;
use switchyard_ws::{connect, discover};
use tracing::debug;

use crate::cli::CliCommand;
use crate::{AppError, CLI_TARGET, screenshot};

/// A command that needs a live connection to a target.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operation {
    Call { method: String, params: Value },
    Listen { topic: String, count: usize },
    Screenshot { url: String, output: Utf8PathBuf },
}

/// Executes a parsed command using the endpoint named in `config`.
pub(crate) async fn execute<W: Write>(
    command: CliCommand,
    config: &Config,
    stdout: &mut W,
) -> Result<(), AppError> {
    let operation = match command {
        CliCommand::Targets => return list_targets(config, stdout).await,
        CliCommand::Call { method, params } => Operation::Call {
            method,
            params: parse_params(params.as_deref())?,
        },
        CliCommand::Listen { topic, count } => Operation::Listen { topic, count },
        CliCommand::Screenshot { url, output } => Operation::Screenshot { url, output },
    };

    let limit = config.call_timeout();
    let mux = bounded(limit, async { Ok(connect(config.discovery_url()).await?) }).await?;
    let outcome = perform(&mux, operation, limit, stdout).await;
    let closed = mux.close().await;
    outcome?;
    closed.map_err(AppError::from)
}

async fn list_targets<W: Write>(config: &Config, stdout: &mut W) -> Result<(), AppError> {
    let client = reqwest::Client::new();
    let targets = bounded(config.call_timeout(), async {
        Ok(discover(&client, config.discovery_url()).await?)
    })
    .await?;
    for target in &targets {
        write_json(stdout, target)?;
    }
    Ok(())
}

/// Runs `operation` on an established connection.
///
/// Calls and the screenshot batch are bounded by `limit`; listening waits
/// until `count` events have arrived.
pub(crate) async fn perform<W: Write>(
    mux: &Multiplexer,
    operation: Operation,
    limit: Duration,
    stdout: &mut W,
) -> Result<(), AppError> {
    let cancel = CancellationToken::new();
    match operation {
        Operation::Call { method, params } => {
            let result = bounded(limit, async {
                Ok(mux.call_value(&method, params, &cancel).await?)
            })
            .await?;
            write_json(stdout, &result)
        }
        Operation::Listen { topic, count } => {
            let (mut listener, _canceler) = mux.listen::<Value>(&topic);
            for _ in 0..count {
                let event = listener.recv(&cancel).await?;
                write_json(stdout, &event)?;
            }
            Ok(())
        }
        Operation::Screenshot { url, output } => {
            let image = bounded(limit, screenshot::capture(mux, &url, &cancel)).await?;
            std::fs::write(&output, &image).map_err(|source| AppError::WriteFile {
                path: output.clone(),
                source,
            })?;
            debug!(target: CLI_TARGET, path = %output, bytes = image.len(), "screenshot written");
            writeln!(stdout, "{output}")?;
            Ok(())
        }
    }
}

fn parse_params(raw: Option<&str>) -> Result<Value, AppError> {
    raw.map(serde_json::from_str)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(AppError::ParseParams)
}

async fn bounded<T, F>(limit: Duration, future: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| AppError::Timeout(limit))?
}

fn write_json<W: Write, T: Serialize>(stdout: &mut W, value: &T) -> Result<(), AppError> {
    serde_json::to_writer(&mut *stdout, value).map_err(AppError::SerialiseOutput)?;
    writeln!(stdout)?;
    Ok(())
}
