//! The connection capability consumed by the multiplexer.

#[cfg(any(test, feature = "test-support"))]
pub(crate) mod memory;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// One complete message exchanged over the transport.
pub type Frame = Bytes;

/// A full-duplex, message-oriented connection.
///
/// Implementations must tolerate one in-flight [`receive`](Self::receive)
/// alongside any number of concurrent [`send`](Self::send) calls. The
/// multiplexer guarantees it never issues two receives at once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends one frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the frame cannot be written.
    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Waits for the next complete frame.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the connection fails or is closed.
    async fn receive(&self) -> Result<Frame, TransportError>;

    /// Closes the connection. A pending [`receive`](Self::receive) must fail
    /// promptly afterwards.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the close handshake fails.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error raised by the underlying protocol implementation.
    #[error("transport backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The remote end closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The connection was closed locally.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Wraps a backend-specific error.
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(error))
    }
}
