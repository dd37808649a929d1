//! CLI argument definitions.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for the switchyard debugging client.
#[derive(Parser, Debug)]
#[command(name = "switchyard", disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations against the first debuggable target.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum CliCommand {
    /// Lists the targets exposed by the discovery endpoint as JSON lines.
    Targets,
    /// Sends one call and prints its result.
    Call {
        /// Method name, for example `Browser.getVersion`.
        #[arg(value_name = "METHOD")]
        method: String,
        /// Params as a JSON object.
        #[arg(value_name = "PARAMS_JSON")]
        params: Option<String>,
    },
    /// Prints events published on a topic.
    Listen {
        /// Event name, for example `Page.loadEventFired`.
        #[arg(value_name = "TOPIC")]
        topic: String,
        /// Number of events to print before exiting.
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Navigates to a URL and saves a full-page PNG screenshot.
    Screenshot {
        /// Page to capture.
        #[arg(value_name = "URL")]
        url: String,
        /// Destination file.
        #[arg(long, default_value = "screenshot.png")]
        output: Utf8PathBuf,
    },
}
