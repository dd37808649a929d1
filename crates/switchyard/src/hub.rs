//! Per-topic fan-out registry.
//!
//! The hub is plain data guarded by the multiplexer's state lock. Broadcast
//! is split in two so the lock is never held while delivering: [`Hub::fanout`]
//! snapshots the senders registered on a topic, and [`Fanout::deliver`] pushes
//! a copy of the frame to each of them after the lock is released.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;

use crate::transport::Frame;

/// Identifies one subscriber handle within a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Subscriber {
    id: SubscriberId,
    sender: mpsc::UnboundedSender<Frame>,
}

/// Topic table mapping each topic to its subscriber handles.
///
/// Entries are created on first subscription and removed once their last
/// subscriber detaches.
#[derive(Debug, Default)]
pub(crate) struct Hub {
    topics: HashMap<String, Vec<Subscriber>>,
    next_subscriber: u64,
}

impl Hub {
    /// Registers a new subscriber on `topic`.
    pub(crate) fn subscribe(
        &mut self,
        topic: &str,
    ) -> (SubscriberId, mpsc::UnboundedReceiver<Frame>) {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber = self.next_subscriber.wrapping_add(1);

        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .entry(topic.to_owned())
            .or_default()
            .push(Subscriber { id, sender });
        (id, receiver)
    }

    /// Removes exactly one subscriber. Unknown handles are ignored.
    pub(crate) fn detach(&mut self, topic: &str, id: SubscriberId) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Drops handles whose receiving side has gone away.
    pub(crate) fn prune_closed(&mut self, topic: &str) {
        if let Some(subscribers) = self.topics.get_mut(topic) {
            subscribers.retain(|subscriber| !subscriber.sender.is_closed());
            if subscribers.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    /// Snapshots the handles registered on `topic` right now.
    pub(crate) fn fanout(&self, topic: &str) -> Option<Fanout> {
        self.topics.get(topic).map(|subscribers| Fanout {
            senders: subscribers
                .iter()
                .map(|subscriber| subscriber.sender.clone())
                .collect(),
        })
    }

    /// Removes every topic, returning how many handles were released.
    ///
    /// Dropping the senders wakes every blocked subscriber.
    pub(crate) fn drain(&mut self) -> usize {
        self.topics.drain().map(|(_, subscribers)| subscribers.len()).sum()
    }

    pub(crate) fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, Vec::len)
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// Senders captured for one broadcast.
#[derive(Debug)]
pub(crate) struct Fanout {
    senders: Vec<mpsc::UnboundedSender<Frame>>,
}

impl Fanout {
    /// Delivers an independent copy of `frame` to every captured handle.
    ///
    /// Returns the number of handles that had already gone away.
    pub(crate) fn deliver(self, frame: &Frame) -> usize {
        self.senders
            .iter()
            .filter(|sender| sender.send(frame.clone()).is_err())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn hub() -> Hub {
        Hub::default()
    }

    #[rstest]
    fn subscribe_creates_topic_lazily(mut hub: Hub) {
        assert_eq!(hub.topic_count(), 0);

        let (_id, _receiver) = hub.subscribe("Page.loadEventFired");

        assert_eq!(hub.topic_count(), 1);
        assert_eq!(hub.subscriber_count("Page.loadEventFired"), 1);
    }

    #[rstest]
    fn broadcast_reaches_every_subscriber(mut hub: Hub) {
        let (_first, mut first_rx) = hub.subscribe("Foo");
        let (_second, mut second_rx) = hub.subscribe("Foo");
        let (_other, mut other_rx) = hub.subscribe("Bar");
        let frame = Bytes::from_static(br#"{"method":"Foo"}"#);

        let stale = hub.fanout("Foo").expect("topic missing").deliver(&frame);

        assert_eq!(stale, 0);
        assert_eq!(first_rx.try_recv().ok(), Some(frame.clone()));
        assert_eq!(second_rx.try_recv().ok(), Some(frame));
        assert!(other_rx.try_recv().is_err());
    }

    #[rstest]
    fn detach_removes_only_that_handle(mut hub: Hub) {
        let (first, _first_rx) = hub.subscribe("Foo");
        let (_second, _second_rx) = hub.subscribe("Foo");

        assert!(hub.detach("Foo", first));
        assert!(!hub.detach("Foo", first), "second detach is a no-op");
        assert_eq!(hub.subscriber_count("Foo"), 1);
    }

    #[rstest]
    fn last_detach_prunes_the_topic(mut hub: Hub) {
        let (id, _receiver) = hub.subscribe("Foo");

        hub.detach("Foo", id);

        assert_eq!(hub.topic_count(), 0);
        assert!(hub.fanout("Foo").is_none());
        assert!(!hub.detach("Foo", id));
    }

    #[rstest]
    fn delivery_reports_and_prunes_dropped_receivers(mut hub: Hub) {
        let (_kept, _kept_rx) = hub.subscribe("Foo");
        let (_gone, gone_rx) = hub.subscribe("Foo");
        drop(gone_rx);

        let stale = hub
            .fanout("Foo")
            .expect("topic missing")
            .deliver(&Bytes::from_static(b"{}"));
        hub.prune_closed("Foo");

        assert_eq!(stale, 1);
        assert_eq!(hub.subscriber_count("Foo"), 1);
    }

    #[rstest]
    fn drain_releases_every_handle(mut hub: Hub) {
        let (_a, mut a_rx) = hub.subscribe("Foo");
        let (_b, _b_rx) = hub.subscribe("Bar");

        assert_eq!(hub.drain(), 2);
        assert_eq!(hub.topic_count(), 0);
        assert!(matches!(
            a_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
