//! CLI entrypoint for the switchyard debugging client.
//!
//! The binary delegates to [`switchyard_cli::run`], which loads
//! configuration, parses the command, and drives a multiplexed DevTools
//! connection.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    switchyard_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
