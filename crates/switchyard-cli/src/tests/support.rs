//! Test support for CLI behavioural coverage.
//!
//! Supplies a fake browser (a target listing served by `wiremock` plus a
//! WebSocket endpoint answering every call) and a world that runs the CLI
//! with a fixed configuration while capturing its output.

use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, ensure};
use futures_util::{SinkExt, StreamExt};
use rstest::fixture;
use serde_json::{Value, json};
use switchyard_config::Config;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{AppError, ConfigLoader, IoStreams, run_with_loader};

pub(super) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(super) const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// A browser stand-in: `/json` lists one page whose debugger URL points at a
/// WebSocket server echoing each call's method and params as its result.
pub(super) struct FakeBrowser {
    listing: MockServer,
    calls: Arc<Mutex<Vec<String>>>,
    // Declared last so the servers shut down before their runtime.
    _runtime: Runtime,
}

impl FakeBrowser {
    pub(super) fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .context("build fake browser runtime")?;
        let calls = Arc::new(Mutex::new(Vec::new()));
        let served = Arc::clone(&calls);
        let listing = runtime.block_on(async move {
            let socket = TcpListener::bind("127.0.0.1:0").await?;
            let address = socket.local_addr()?;
            tokio::spawn(serve_devtools(socket, served));

            let listing = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                    "id": "page-1",
                    "type": "page",
                    "url": "about:blank",
                    "webSocketDebuggerUrl": format!("ws://{address}/devtools/page/page-1"),
                }])))
                .mount(&listing)
                .await;
            Ok::<_, std::io::Error>(listing)
        })?;
        Ok(Self {
            listing,
            calls,
            _runtime: runtime,
        })
    }

    pub(super) fn discovery_url(&self) -> String {
        format!("{}/json", self.listing.uri())
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

async fn serve_devtools(socket: TcpListener, calls: Arc<Mutex<Vec<String>>>) {
    while let Ok((stream, _)) = socket.accept().await {
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            let Ok(mut connection) = accept_async(stream).await else {
                return;
            };
            while let Some(Ok(message)) = connection.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let Ok(request) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let method = request
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned();
                if let Ok(mut calls) = calls.lock() {
                    calls.push(method.clone());
                }
                let reply = json!({
                    "id": request.get("id").cloned().unwrap_or(Value::Null),
                    "result": {
                        "method": method,
                        "params": request.get("params").cloned().unwrap_or(Value::Null),
                    },
                });
                if connection.send(Message::Text(reply.to_string())).await.is_err() {
                    break;
                }
            }
        });
    }
}

pub(super) struct TestWorld {
    pub(super) config: Config,
    pub(super) browser: Option<FakeBrowser>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<ExitCode>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            config: Config {
                call_timeout_secs: 5,
                ..Config::default()
            },
            browser: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
        }
    }
}

impl TestWorld {
    pub(super) fn start_browser(&mut self) -> Result<()> {
        let browser = FakeBrowser::start()?;
        self.config.discovery_url = browser.discovery_url();
        self.browser = Some(browser);
        Ok(())
    }

    pub(super) fn run(&mut self, command: &str) {
        self.stdout.clear();
        self.stderr.clear();
        let args = Self::build_args(command);
        let loader = StaticConfigLoader::new(self.config.clone());
        let mut io = IoStreams::new(&mut self.stdout, &mut self.stderr);
        self.exit_code = Some(run_with_loader(args, &mut io, &loader));
    }

    pub(super) fn build_args(command: &str) -> Vec<OsString> {
        let mut args = vec![OsString::from("switchyard")];
        args.extend(
            command
                .trim()
                .trim_matches('"')
                .split_whitespace()
                .map(OsString::from),
        );
        args
    }

    pub(super) fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).context("stdout utf8")
    }

    pub(super) fn stderr_text(&self) -> Result<String> {
        String::from_utf8(self.stderr.clone()).context("stderr utf8")
    }

    pub(super) fn assert_exit_code(&self, expected: ExitCode) -> Result<()> {
        let exit = self.exit_code.context("exit code recorded")?;
        ensure!(exit == expected, "expected {expected:?}, got {exit:?}");
        Ok(())
    }

    pub(super) fn browser_calls(&self) -> Result<Vec<String>> {
        self.browser
            .as_ref()
            .map(FakeBrowser::calls)
            .context("no fake browser running")
    }
}

#[fixture]
pub(super) fn world() -> std::cell::RefCell<TestWorld> {
    std::cell::RefCell::new(TestWorld::default())
}
