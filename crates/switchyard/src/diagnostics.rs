//! Side channel for raw traffic and terminal failures.
//!
//! A sink only observes; nothing it does feeds back into routing.

use tracing::{debug, trace, warn};

use crate::mux::MUX_TARGET;
use crate::transport::TransportError;

/// Observer of inbound traffic and reader termination.
///
/// Every method has a no-op default so implementations can pick the events
/// they care about.
pub trait DiagnosticSink: Send + Sync {
    /// Called with every raw frame the reader task receives.
    fn inbound(&self, frame: &[u8]) {
        let _ = frame;
    }

    /// Called when an inbound frame is not a valid envelope and is skipped.
    fn malformed(&self, frame: &[u8], error: &serde_json::Error) {
        let _ = (frame, error);
    }

    /// Called once when the reader task stops because the transport failed
    /// or was closed.
    fn terminated(&self, error: &TransportError) {
        let _ = error;
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn inbound(&self, frame: &[u8]) {
        trace!(
            target: MUX_TARGET,
            frame = %String::from_utf8_lossy(frame),
            "inbound frame"
        );
    }

    fn malformed(&self, frame: &[u8], error: &serde_json::Error) {
        warn!(
            target: MUX_TARGET,
            %error,
            len = frame.len(),
            "skipping malformed inbound frame"
        );
    }

    fn terminated(&self, error: &TransportError) {
        match error {
            TransportError::Closed => debug!(target: MUX_TARGET, "reader stopped after close"),
            other => warn!(target: MUX_TARGET, error = %other, "reader stopped"),
        }
    }
}

/// Discards all diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticSink for NullSink {}
