//! Error types surfaced by the multiplexer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Error object carried by a response frame.
///
/// Displays its `message`, or the decimal `code` when the message is empty.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemoteError {
    /// Protocol error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable message; may be empty.
    #[serde(default)]
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    /// Builds an error object without additional data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(formatter, "{}", self.code)
        } else {
            formatter.write_str(&self.message)
        }
    }
}

impl std::error::Error for RemoteError {}

/// Errors returned by [`crate::Multiplexer`] operations and [`crate::Batch`]
/// runs.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The call parameters could not be serialised.
    #[error("failed to encode request params: {0}")]
    Encode(#[source] serde_json::Error),

    /// An inbound frame or its payload could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[source] serde_json::Error),

    /// The remote end answered the call with an error object.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Sending the request frame failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The caller's cancellation signal fired while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// The multiplexer was closed while, or before, waiting.
    #[error("multiplexer closed")]
    Closed,

    /// The reader task stopped because the transport failed.
    #[error("connection lost: {source}")]
    Disconnected {
        /// Failure reported by the transport.
        #[source]
        source: Arc<TransportError>,
    },
}

impl MuxError {
    /// Returns the remote error object when the call was rejected remotely.
    #[must_use]
    pub const fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(error) => Some(error),
            _ => None,
        }
    }

    /// Returns `true` for errors that end the multiplexer for every caller.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Disconnected { .. })
    }
}
