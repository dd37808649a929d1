//! The multiplexer: correlation-id routing, topic fan-out and teardown.

mod listener;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use listener::{Canceler, Listener};

use self::state::{Shutdown, State};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::errors::MuxError;
use crate::frame::{Inbound, Request, Response};
use crate::hub::SubscriberId;
use crate::transport::{Frame, Transport};

/// Log target for multiplexer operations.
pub(crate) const MUX_TARGET: &str = "switchyard::mux";

/// Shares one transport between concurrent calls and event listeners.
///
/// Construction spawns the reader task, so it must happen inside a Tokio
/// runtime. All operations take `&self`; wrap the multiplexer in an [`Arc`]
/// to share it between tasks.
///
/// Dropping the multiplexer tears it down like [`close`](Self::close) does,
/// except that the transport is released by drop rather than closed
/// explicitly.
pub struct Multiplexer {
    shared: Arc<Shared>,
    reader: JoinHandle<()>,
}

pub(crate) struct Shared {
    transport: Box<dyn Transport>,
    sink: Arc<dyn DiagnosticSink>,
    state: Mutex<State>,
    /// Fires once the shutdown reason is recorded; wakes calls still sending.
    stopped: CancellationToken,
}

impl Multiplexer {
    /// Binds a multiplexer to a live transport, reporting diagnostics through
    /// `tracing`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::with_sink(transport, Arc::new(TracingSink))
    }

    /// Binds a multiplexer to a live transport with a custom diagnostic sink.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn with_sink(transport: impl Transport, sink: Arc<dyn DiagnosticSink>) -> Self {
        let shared = Arc::new(Shared {
            transport: Box::new(transport),
            sink,
            state: Mutex::new(State::default()),
            stopped: CancellationToken::new(),
        });
        let reader = tokio::spawn(read_frames(Arc::clone(&shared)));
        Self { shared, reader }
    }

    /// Calls `method` and decodes the response result into `R`.
    ///
    /// Use [`serde::de::IgnoredAny`] for `R` to discard the result.
    ///
    /// # Errors
    ///
    /// - [`MuxError::Encode`] when `params` cannot be serialised.
    /// - [`MuxError::Remote`] when the response carries an error object.
    /// - [`MuxError::Protocol`] when the response or its result cannot be
    ///   decoded.
    /// - [`MuxError::Cancelled`] when `cancel` fires first.
    /// - [`MuxError::Closed`] or [`MuxError::Disconnected`] when the
    ///   multiplexer stops first.
    /// - [`MuxError::Transport`] when the request cannot be sent.
    pub async fn call<P, R>(
        &self,
        method: &str,
        params: P,
        cancel: &CancellationToken,
    ) -> Result<R, MuxError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params).map_err(MuxError::Encode)?;
        let result = self.call_value(method, params, cancel).await?;
        serde_json::from_value(result).map_err(MuxError::Protocol)
    }

    /// Calls `method` with untyped params and returns the untyped result.
    ///
    /// A response without a `result` yields JSON `null`.
    ///
    /// # Errors
    ///
    /// As for [`call`](Self::call), minus result decoding.
    pub async fn call_value(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, MuxError> {
        if cancel.is_cancelled() {
            return Err(MuxError::Cancelled);
        }

        let (slot, delivery) = oneshot::channel();
        let id = self.shared.register(slot)?;
        let mut pending = PendingGuard {
            shared: &self.shared,
            id,
            armed: true,
        };

        let exchange = async {
            let frame = Request::new(id, method, params)
                .encode()
                .map_err(MuxError::Encode)?;
            debug!(target: MUX_TARGET, id, method, "sending request");
            if let Err(error) = self.shared.transport.send(frame).await {
                // A send cut short by teardown reports the teardown.
                return Err(if self.shared.stopped.is_cancelled() {
                    self.shared.shutdown_error()
                } else {
                    MuxError::Transport(error)
                });
            }
            delivery.await.map_err(|_| self.shared.shutdown_error())
        };

        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(target: MUX_TARGET, id, method, "call cancelled");
                return Err(MuxError::Cancelled);
            }
            outcome = exchange => outcome?,
            () = self.shared.stopped.cancelled() => {
                debug!(target: MUX_TARGET, id, method, "call released by shutdown");
                return Err(self.shared.shutdown_error());
            }
        };
        pending.armed = false;

        Response::decode(&frame)
            .map_err(MuxError::Protocol)?
            .into_value()
    }

    /// Subscribes to events published on `topic`.
    ///
    /// The returned [`Listener`] yields each subsequent event decoded into
    /// `T`; the [`Canceler`] detaches it. Listening on a stopped multiplexer
    /// succeeds, but the listener only ever reports the shutdown error.
    #[must_use]
    pub fn listen<T: DeserializeOwned>(&self, topic: &str) -> (Listener<T>, Canceler) {
        let subscription = {
            let mut state = self.shared.lock();
            if state.shutdown.is_some() {
                None
            } else {
                Some(state.hub.subscribe(topic))
            }
        };
        let shared = Arc::downgrade(&self.shared);
        match subscription {
            Some((id, receiver)) => {
                debug!(target: MUX_TARGET, topic, subscriber = %id, "subscribed");
                let canceler = Canceler::new(Weak::clone(&shared), topic, id);
                (Listener::new(receiver, canceler.clone(), shared), canceler)
            }
            None => {
                debug!(target: MUX_TARGET, topic, "listen after shutdown");
                let canceler = Canceler::inert(topic);
                (Listener::stopped(canceler.clone(), shared), canceler)
            }
        }
    }

    /// Tears the multiplexer down.
    ///
    /// Every blocked call and listener is released with [`MuxError::Closed`],
    /// both tables are cleared and the transport is closed. Closing again is a
    /// no-op that returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`MuxError::Transport`] when closing the transport fails.
    pub async fn close(&self) -> Result<(), MuxError> {
        self.shared.shut_down(Shutdown::Closed);

        let first_close = {
            let mut state = self.shared.lock();
            !std::mem::replace(&mut state.transport_closed, true)
        };
        if first_close {
            debug!(target: MUX_TARGET, "closing transport");
            self.shared.transport.close().await?;
        }
        Ok(())
    }

    /// Returns `true` once the multiplexer has been closed or its reader has
    /// stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.lock().shutdown.is_some()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.lock().pending_len()
    }

    /// Number of listeners currently attached to `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.lock().hub.subscriber_count(topic)
    }

    /// Number of topics with at least one listener.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.shared.lock().hub.topic_count()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.shared.shut_down(Shutdown::Closed);
        self.reader.abort();
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        formatter
            .debug_struct("Multiplexer")
            .field("pending", &state.pending_len())
            .field("topics", &state.hub.topic_count())
            .field("shutdown", &state.shutdown)
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Locks the shared state, recovering from poisoning so teardown still
    /// works after a panic elsewhere.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, slot: oneshot::Sender<Frame>) -> Result<i64, MuxError> {
        let mut state = self.lock();
        if let Some(shutdown) = &state.shutdown {
            return Err(shutdown.error());
        }
        Ok(state.register(slot))
    }

    fn unregister(&self, id: i64) {
        if self.lock().take(id).is_some() {
            debug!(target: MUX_TARGET, id, "removed abandoned call");
        }
    }

    pub(crate) fn detach(&self, topic: &str, id: SubscriberId) {
        if self.lock().hub.detach(topic, id) {
            debug!(target: MUX_TARGET, topic, subscriber = %id, "detached");
        }
    }

    pub(crate) fn shutdown_error(&self) -> MuxError {
        self.lock()
            .shutdown
            .as_ref()
            .map_or(MuxError::Closed, Shutdown::error)
    }

    /// Records the shutdown reason and releases every waiter. Only the first
    /// call has any effect.
    fn shut_down(&self, reason: Shutdown) -> bool {
        let (pending, subscribers) = {
            let mut state = self.lock();
            if state.shutdown.is_some() {
                return false;
            }
            state.shutdown = Some(reason);
            (state.drain_pending(), state.hub.drain())
        };
        self.stopped.cancel();
        debug!(
            target: MUX_TARGET,
            pending = pending.len(),
            subscribers,
            "released waiters"
        );
        drop(pending);
        true
    }

    fn dispatch(&self, frame: Frame) {
        self.sink.inbound(&frame);
        match Inbound::classify(&frame) {
            Ok(Inbound::Response { id }) => self.deliver_response(id, frame),
            Ok(Inbound::Event { topic }) => self.broadcast(&topic, &frame),
            Ok(Inbound::Unroutable) => {
                debug!(target: MUX_TARGET, "skipping frame without id or method");
            }
            Err(error) => self.sink.malformed(&frame, &error),
        }
    }

    fn deliver_response(&self, id: i64, frame: Frame) {
        let slot = self.lock().take(id);
        match slot {
            Some(slot) => {
                if slot.send(frame).is_err() {
                    debug!(target: MUX_TARGET, id, "caller gone before delivery");
                }
            }
            None => debug!(target: MUX_TARGET, id, "discarding response without pending call"),
        }
    }

    fn broadcast(&self, topic: &str, frame: &Frame) {
        let fanout = self.lock().hub.fanout(topic);
        let Some(fanout) = fanout else {
            return;
        };
        if fanout.deliver(frame) > 0 {
            self.lock().hub.prune_closed(topic);
        }
    }
}

/// Removes the pending entry when a call ends without a delivered response,
/// including when the call future is dropped mid-flight.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: i64,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.unregister(self.id);
        }
    }
}

/// Reader task body: routes frames until the transport fails, then releases
/// every waiter.
async fn read_frames(shared: Arc<Shared>) {
    let error = loop {
        match shared.transport.receive().await {
            Ok(frame) => shared.dispatch(frame),
            Err(error) => break error,
        }
    };
    shared.sink.terminated(&error);
    shared.shut_down(Shutdown::Disconnected(Arc::new(error)));
}
