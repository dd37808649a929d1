//! Shared tables guarded by the multiplexer lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::errors::MuxError;
use crate::hub::Hub;
use crate::transport::{Frame, TransportError};

/// Why the multiplexer stopped.
#[derive(Debug, Clone)]
pub(crate) enum Shutdown {
    /// [`crate::Multiplexer::close`] was called or the handle was dropped.
    Closed,
    /// The reader task observed a transport failure.
    Disconnected(Arc<TransportError>),
}

impl Shutdown {
    pub(crate) fn error(&self) -> MuxError {
        match self {
            Self::Closed => MuxError::Closed,
            Self::Disconnected(source) => MuxError::Disconnected {
                source: Arc::clone(source),
            },
        }
    }
}

/// Everything the reader task and callers share.
#[derive(Debug)]
pub(crate) struct State {
    next_id: i64,
    pending: HashMap<i64, oneshot::Sender<Frame>>,
    pub(crate) hub: Hub,
    pub(crate) shutdown: Option<Shutdown>,
    pub(crate) transport_closed: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
            hub: Hub::default(),
            shutdown: None,
            transport_closed: false,
        }
    }
}

impl State {
    /// Registers a delivery slot under an id that is not currently pending.
    ///
    /// Scans forward from the rolling counter, skipping ids still in use, then
    /// moves the counter past the chosen id.
    pub(crate) fn register(&mut self, slot: oneshot::Sender<Frame>) -> i64 {
        let mut id = self.next_id;
        while self.pending.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next_id = id.wrapping_add(1);
        self.pending.insert(id, slot);
        id
    }

    /// Removes the slot for `id`, if it is still pending.
    pub(crate) fn take(&mut self, id: i64) -> Option<oneshot::Sender<Frame>> {
        self.pending.remove(&id)
    }

    /// Empties the pending table, handing the slots back to the caller.
    pub(crate) fn drain_pending(&mut self) -> HashMap<i64, oneshot::Sender<Frame>> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) const fn rewind(&mut self, next_id: i64) {
        self.next_id = next_id;
    }
}
