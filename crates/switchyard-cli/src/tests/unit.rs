//! Unit coverage for the CLI entry point.

use std::cell::RefCell;
use std::ffi::OsString;
use std::process::ExitCode;

use rstest::rstest;
use switchyard_config::Config;

use super::support::{StaticConfigLoader, TestWorld};
use crate::{AppError, ConfigLoader, IoStreams, run_with_loader};

/// Records the arguments handed to the loader.
struct RecordingLoader {
    seen: RefCell<Vec<OsString>>,
}

impl ConfigLoader for RecordingLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        self.seen.replace(args.to_vec());
        Ok(Config::default())
    }
}

fn run(command: &str, loader: &impl ConfigLoader) -> (ExitCode, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut io = IoStreams::new(&mut stdout, &mut stderr);
    let exit = run_with_loader(TestWorld::build_args(command), &mut io, loader);
    (
        exit,
        String::from_utf8(stdout).expect("stdout utf8"),
        String::from_utf8(stderr).expect("stderr utf8"),
    )
}

#[rstest]
fn help_goes_to_stdout_and_succeeds() {
    let (exit, stdout, stderr) = run("--help", &StaticConfigLoader::new(Config::default()));

    assert_eq!(exit, ExitCode::SUCCESS);
    assert!(stdout.contains("screenshot"), "stdout was {stdout:?}");
    assert!(stderr.is_empty());
}

#[rstest]
#[case("")]
#[case("call")]
#[case("listen Page.loadEventFired --count none")]
fn usage_errors_exit_with_clap_code(#[case] command: &str) {
    let (exit, stdout, stderr) = run(command, &StaticConfigLoader::new(Config::default()));

    assert_eq!(exit, ExitCode::from(2));
    assert!(stdout.is_empty());
    assert!(stderr.contains("Usage"), "stderr was {stderr:?}");
}

#[rstest]
fn leading_configuration_flags_reach_the_loader() {
    let loader = RecordingLoader {
        seen: RefCell::new(Vec::new()),
    };

    let (exit, _, stderr) = run(
        "--log-filter debug --call-timeout-secs=3 call Page.navigate not-json",
        &loader,
    );

    assert_eq!(exit, ExitCode::FAILURE);
    assert!(stderr.contains("params must be a JSON value"));
    assert_eq!(
        loader.seen.into_inner(),
        TestWorld::build_args("--log-filter debug --call-timeout-secs=3")
    );
}

#[rstest]
fn usage_errors_skip_configuration_loading() {
    let loader = RecordingLoader {
        seen: RefCell::new(Vec::new()),
    };

    let (exit, _, _) = run("--log-filter debug", &loader);

    assert_eq!(exit, ExitCode::from(2));
    assert!(loader.seen.into_inner().is_empty());
}
