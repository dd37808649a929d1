//! Correlation-id and topic multiplexer for a single message-oriented
//! connection.
//!
//! Many request/response exchanges and many event subscriptions share one
//! full-duplex [`Transport`]. The [`Multiplexer`] owns the transport, runs a
//! single reader task, routes responses to their callers by correlation id
//! and fans events out to every [`Listener`] subscribed to their topic.
//! [`Batch`] composes calls and listens into an ordered plan that subscribes
//! to every event before the first call is sent, so an event triggered by a
//! call can never slip past its listener.
//!
//! # Example
//!
//! ```ignore
//! use switchyard::{Batch, Multiplexer};
//! use tokio_util::sync::CancellationToken;
//!
//! let mux = Multiplexer::new(transport);
//! let cancel = CancellationToken::new();
//!
//! let mut batch = Batch::new();
//! batch.call::<_, serde::de::IgnoredAny>("Page.navigate", json!({"url": url}));
//! let loaded = batch.listen::<serde_json::Value>("Page.loadEventFired");
//! batch.run(&mux, &cancel).await?;
//! ```

mod batch;
mod diagnostics;
mod errors;
mod frame;
mod hub;
mod mux;
mod transport;

#[cfg(test)]
mod tests;

pub use batch::{Batch, Slot};
pub use diagnostics::{DiagnosticSink, NullSink, TracingSink};
pub use errors::{MuxError, RemoteError};
pub use frame::{Event, Inbound, Request, Response};
pub use hub::SubscriberId;
pub use mux::{Canceler, Listener, Multiplexer};
pub use transport::{Frame, Transport, TransportError};

#[cfg(any(test, feature = "test-support"))]
pub use transport::memory::{MemoryPeer, MemoryTransport};

/// Re-exported so callers can build cancellation signals without a direct
/// dependency on `tokio-util`.
pub use tokio_util::sync::CancellationToken;
