//! Command-line runtime for the switchyard debugging client.
//!
//! The module owns argument parsing, configuration bootstrapping, telemetry
//! and the async runtime that drives a multiplexed DevTools connection. The
//! entry point can be exercised from the binary and from tests where the
//! configuration loader and IO streams are substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use switchyard_config::Config;

mod cli;
mod commands;
mod config;
mod errors;
mod screenshot;
pub mod telemetry;

#[cfg(test)]
mod tests;

use cli::Cli;
use config::{ConfigArgumentSplit, split_config_arguments};
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;

pub(crate) const CLI_TARGET: &str = "switchyard_cli";

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let ConfigArgumentSplit {
        config_arguments,
        command_arguments,
    } = split_config_arguments(&args);

    let result = Cli::try_parse_from(command_arguments)
        .map_err(AppError::CliUsage)
        .and_then(|cli| loader.load(&config_arguments).map(|config| (cli, config)))
        .and_then(|(cli, config)| {
            telemetry::initialise(&config)?;
            execute_blocking(cli, &config, &mut *io.stdout)
        });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppError::CliUsage(error)) => report_usage(&error, io),
        Err(error) => {
            let _ = writeln!(io.stderr, "{error}");
            ExitCode::FAILURE
        }
    }
}

fn execute_blocking<W: Write>(cli: Cli, config: &Config, stdout: &mut W) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(commands::execute(cli.command, config, stdout))
}

/// Prints clap output to the stream clap asks for and maps its exit code.
fn report_usage<W: Write, E: Write>(error: &clap::Error, io: &mut IoStreams<'_, W, E>) -> ExitCode {
    let rendered = error.render();
    let _ = if error.use_stderr() {
        write!(io.stderr, "{rendered}")
    } else {
        write!(io.stdout, "{rendered}")
    };
    u8::try_from(error.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}
