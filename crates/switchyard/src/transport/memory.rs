//! In-memory transport pair for tests.
//!
//! [`MemoryTransport`] is handed to the multiplexer; the matching
//! [`MemoryPeer`] plays the remote end, reading requests and writing
//! responses or events. Dropping the peer looks like a dropped connection.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::{Frame, Transport, TransportError};
use crate::errors::RemoteError;
use crate::frame::{Event, Request, Response};

/// The client half of an in-memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
    closed: CancellationToken,
}

/// The remote half of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    requests: mpsc::UnboundedReceiver<Frame>,
    frames: mpsc::UnboundedSender<Frame>,
}

impl MemoryTransport {
    /// Creates a connected transport/peer pair.
    #[must_use]
    pub fn pair() -> (Self, MemoryPeer) {
        let (client_tx, peer_rx) = mpsc::unbounded_channel();
        let (peer_tx, client_rx) = mpsc::unbounded_channel();
        let transport = Self {
            outbound: client_tx,
            inbound: Mutex::new(client_rx),
            closed: CancellationToken::new(),
        };
        let peer = MemoryPeer {
            requests: peer_rx,
            frames: peer_tx,
        };
        (transport, peer)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn receive(&self) -> Result<Frame, TransportError> {
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(TransportError::Closed),
            frame = inbound.recv() => frame.ok_or(TransportError::ConnectionClosed),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.cancel();
        Ok(())
    }
}

impl MemoryPeer {
    /// Waits for the next raw frame sent by the client.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.requests.recv().await
    }

    /// Waits for the next request, skipping frames that are not requests.
    pub async fn recv_request(&mut self) -> Option<Request> {
        while let Some(frame) = self.requests.recv().await {
            if let Ok(request) = Request::decode(&frame) {
                return Some(request);
            }
        }
        None
    }

    /// Pushes a raw frame to the client. Returns `false` once the client has
    /// gone away.
    pub fn send_raw(&self, frame: impl Into<Bytes>) -> bool {
        self.frames.send(frame.into()).is_ok()
    }

    /// Answers request `id` with `result`.
    pub fn respond(&self, id: i64, result: Value) -> bool {
        Response::success(id, result)
            .encode()
            .is_ok_and(|frame| self.send_raw(frame))
    }

    /// Answers request `id` with an error object.
    pub fn reject(&self, id: i64, error: RemoteError) -> bool {
        Response::failure(id, error)
            .encode()
            .is_ok_and(|frame| self.send_raw(frame))
    }

    /// Publishes an event on `topic`.
    pub fn emit(&self, topic: &str, params: Value) -> bool {
        Event::new(topic, params)
            .encode()
            .is_ok_and(|frame| self.send_raw(frame))
    }
}
