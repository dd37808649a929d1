//! Subscriber handles returned by [`Multiplexer::listen`](super::Multiplexer::listen).

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Shared;
use crate::errors::MuxError;
use crate::frame::Event;
use crate::hub::SubscriberId;
use crate::transport::Frame;

/// Receives events published on one topic, decoded into `T`.
///
/// Events published before the listener was created are never seen. Each
/// event is delivered at most once per listener, in arrival order. Dropping
/// the listener detaches it.
pub struct Listener<T> {
    receiver: Option<mpsc::UnboundedReceiver<Frame>>,
    canceler: Canceler,
    shared: Weak<Shared>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Listener<T> {
    pub(super) fn new(
        receiver: mpsc::UnboundedReceiver<Frame>,
        canceler: Canceler,
        shared: Weak<Shared>,
    ) -> Self {
        Self {
            receiver: Some(receiver),
            canceler,
            shared,
            _marker: PhantomData,
        }
    }

    pub(super) fn stopped(canceler: Canceler, shared: Weak<Shared>) -> Self {
        Self {
            receiver: None,
            canceler,
            shared,
            _marker: PhantomData,
        }
    }

    /// Waits for the next event on the topic.
    ///
    /// # Errors
    ///
    /// - [`MuxError::Cancelled`] when `cancel` fires or the listener has been
    ///   detached through its [`Canceler`].
    /// - [`MuxError::Closed`] or [`MuxError::Disconnected`] when the
    ///   multiplexer stops.
    /// - [`MuxError::Protocol`] when the event payload does not decode into
    ///   `T`. The listener stays usable afterwards.
    pub async fn recv(&mut self, cancel: &CancellationToken) -> Result<T, MuxError> {
        if cancel.is_cancelled() || self.canceler.is_cancelled() {
            return Err(MuxError::Cancelled);
        }
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(self.stopped_error());
        };

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MuxError::Cancelled),
            next = receiver.recv() => next,
        };

        match next {
            Some(frame) => Event::decode(&frame)
                .map_err(MuxError::Protocol)?
                .params_into(),
            None => {
                self.receiver = None;
                Err(self.stopped_error())
            }
        }
    }

    /// Returns a handle that detaches this listener.
    #[must_use]
    pub fn canceler(&self) -> Canceler {
        self.canceler.clone()
    }

    /// The topic this listener is attached to.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.canceler.topic()
    }

    fn stopped_error(&self) -> MuxError {
        if self.canceler.is_cancelled() {
            return MuxError::Cancelled;
        }
        self.shared
            .upgrade()
            .map_or(MuxError::Closed, |shared| shared.shutdown_error())
    }
}

impl<T> Drop for Listener<T> {
    fn drop(&mut self) {
        self.canceler.cancel();
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Listener")
            .field("topic", &self.canceler.topic())
            .field("attached", &self.receiver.is_some())
            .finish_non_exhaustive()
    }
}

/// Detaches one listener from its topic.
///
/// Cancelling is idempotent and safe after the multiplexer has closed.
#[derive(Clone)]
pub struct Canceler {
    inner: Arc<CancelerInner>,
}

struct CancelerInner {
    shared: Weak<Shared>,
    topic: String,
    id: Option<SubscriberId>,
    detached: AtomicBool,
}

impl Canceler {
    pub(super) fn new(shared: Weak<Shared>, topic: &str, id: SubscriberId) -> Self {
        Self::build(shared, topic, Some(id))
    }

    /// A canceler for a listener that never attached.
    pub(super) fn inert(topic: &str) -> Self {
        Self::build(Weak::new(), topic, None)
    }

    fn build(shared: Weak<Shared>, topic: &str, id: Option<SubscriberId>) -> Self {
        Self {
            inner: Arc::new(CancelerInner {
                shared,
                topic: topic.to_owned(),
                id,
                detached: AtomicBool::new(false),
            }),
        }
    }

    /// Removes the listener from its topic. Later calls do nothing.
    pub fn cancel(&self) {
        if self.inner.detached.swap(true, Ordering::AcqRel) {
            return;
        }
        if let (Some(id), Some(shared)) = (self.inner.id, self.inner.shared.upgrade()) {
            shared.detach(&self.inner.topic, id);
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// The topic the listener is attached to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }
}

impl fmt::Debug for Canceler {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Canceler")
            .field("topic", &self.inner.topic)
            .field("subscriber", &self.inner.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
