//! Shared fixtures and helpers for multiplexer tests.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::diagnostics::DiagnosticSink;
use crate::errors::RemoteError;
use crate::frame::Request;
use crate::mux::Multiplexer;
use crate::transport::{Frame, Transport, TransportError};
use crate::transport::memory::{MemoryPeer, MemoryTransport};

/// One action the scripted peer takes in answer to a request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with a `result`.
    Result(Value),
    /// Answer with an `error` object.
    Error(RemoteError),
    /// Publish an event before (or instead of) answering.
    Emit(String, Value),
}

/// Methods the scripted peer has received, in arrival order.
pub type Received = Arc<Mutex<Vec<String>>>;

/// Spawns a task that answers every request according to `script`.
pub fn spawn_peer<F>(mut peer: MemoryPeer, script: F) -> Received
where
    F: Fn(&Request) -> Vec<Reply> + Send + 'static,
{
    let received = Received::default();
    let log = Arc::clone(&received);
    tokio::spawn(async move {
        while let Some(request) = peer.recv_request().await {
            log.lock()
                .expect("received log poisoned")
                .push(request.method.clone());
            for reply in script(&request) {
                match reply {
                    Reply::Result(result) => peer.respond(request.id, result),
                    Reply::Error(error) => peer.reject(request.id, error),
                    Reply::Emit(topic, params) => peer.emit(&topic, params),
                };
            }
        }
    });
    received
}

/// Answers every request by echoing its params back as the result.
pub fn echo(request: &Request) -> Vec<Reply> {
    vec![Reply::Result(request.params.clone().unwrap_or(Value::Null))]
}

/// Answers every request with an empty object.
pub fn acknowledge(_request: &Request) -> Vec<Reply> {
    vec![Reply::Result(json!({}))]
}

/// Builds a multiplexer over a fresh in-memory pair.
pub fn connected() -> (Multiplexer, MemoryPeer) {
    let (transport, peer) = MemoryTransport::pair();
    (Multiplexer::new(transport), peer)
}

/// Snapshot of the methods received so far.
pub fn methods(received: &Received) -> Vec<String> {
    received.lock().expect("received log poisoned").clone()
}

/// Awaits `future`, failing the test if it does not finish promptly.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("operation did not finish in time")
}

/// Counts diagnostic callbacks.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub inbound: AtomicUsize,
    pub malformed: AtomicUsize,
    pub terminated: AtomicUsize,
}

impl RecordingSink {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl DiagnosticSink for RecordingSink {
    fn inbound(&self, _frame: &[u8]) {
        self.inbound.fetch_add(1, Ordering::SeqCst);
    }

    fn malformed(&self, _frame: &[u8], _error: &serde_json::Error) {
        self.malformed.fetch_add(1, Ordering::SeqCst);
    }

    fn terminated(&self, _error: &TransportError) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

/// How a [`StalledTransport`] send behaves once it has started.
#[derive(Debug, Clone, Copy)]
pub enum Stall {
    /// The send never completes.
    Forever,
    /// The send completes with [`TransportError::Closed`] once the transport
    /// is closed.
    UntilClosed,
}

/// A transport whose peer never reads: every send parks.
#[derive(Debug)]
pub struct StalledTransport {
    stall: Stall,
    closed: CancellationToken,
}

impl StalledTransport {
    pub fn new(stall: Stall) -> Self {
        Self {
            stall,
            closed: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, _frame: Frame) -> Result<(), TransportError> {
        match self.stall {
            Stall::Forever => std::future::pending().await,
            Stall::UntilClosed => {
                self.closed.cancelled().await;
                Err(TransportError::Closed)
            }
        }
    }

    async fn receive(&self) -> Result<Frame, TransportError> {
        self.closed.cancelled().await;
        Err(TransportError::Closed)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }
}
