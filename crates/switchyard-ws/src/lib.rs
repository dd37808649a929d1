//! WebSocket plumbing for the switchyard multiplexer.
//!
//! [`WsTransport`] adapts a `tokio-tungstenite` stream to the
//! [`switchyard::Transport`] contract. The [`discovery`] module lists the
//! debugging targets a DevTools endpoint exposes and connects a
//! [`switchyard::Multiplexer`] to one of them.

pub mod discovery;
mod transport;

pub use discovery::{DiscoveryError, Target, connect, discover};
pub use transport::{WsTransport, dial};

/// Log target for WebSocket transport and discovery events.
pub(crate) const WS_TARGET: &str = "switchyard_ws";
