//! Topic-keyed pub/sub event bus.
//!
//! Decouples the DCP internals from their subscribers: publishers fire and
//! forget, subscribers receive over a broadcast channel. Publishing to a
//! topic nobody listens on is not an error, and a publisher never learns who
//! (if anyone) consumed the event, so subscriber code cannot re-enter the
//! publishing subsystem through the bus.

use crate::models::PersistSeqNo;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

/// Well-known bus topics.
pub mod topic {
    /// Carries [`BusEvent::PersistSeqNoChanged`] updates from rollback
    /// mitigation to the stream checkpoint layer.
    pub const PERSIST_SEQNO_CHANGED: &str = "persist-seqno-changed";
}

/// Events carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The safe minimum persisted seqno of a vBucket was recomputed.
    PersistSeqNoChanged(PersistSeqNo),
}

/// Default per-topic channel capacity. Slow subscribers past this point see
/// `RecvError::Lagged` and skip ahead; they must tolerate missed updates.
const DEFAULT_CAPACITY: usize = 1024;

/// Topic-keyed broadcast bus.
pub struct EventBus {
    topics: DashMap<String, broadcast::Sender<BusEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    /// Publish an event to a topic, fire-and-forget.
    pub fn publish(&self, topic: &str, event: BusEvent) {
        let sender = self.sender(topic);
        match sender.send(event) {
            Ok(receivers) => trace!(topic, receivers, "published bus event"),
            // No live subscribers; the event is dropped by contract.
            Err(_) => trace!(topic, "published bus event with no subscribers"),
        }
    }

    /// Subscribe to a topic. Events published before the subscription are not
    /// replayed.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusEvent> {
        self.sender(topic).subscribe()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<BusEvent> {
        if let Some(sender) = self.topics.get(topic) {
            return sender.clone();
        }
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(topic::PERSIST_SEQNO_CHANGED);

        let event = BusEvent::PersistSeqNoChanged(PersistSeqNo {
            vb_id: 42,
            seq_no: 100,
        });
        bus.publish(topic::PERSIST_SEQNO_CHANGED, event.clone());

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish(
            topic::PERSIST_SEQNO_CHANGED,
            BusEvent::PersistSeqNoChanged(PersistSeqNo { vb_id: 0, seq_no: 0 }),
        );
    }

    #[tokio::test]
    async fn all_subscribers_receive_each_event() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe("t");
        let mut rx2 = bus.subscribe("t");

        let event = BusEvent::PersistSeqNoChanged(PersistSeqNo {
            vb_id: 7,
            seq_no: 9,
        });
        bus.publish("t", event.clone());

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::new();
        let mut other = bus.subscribe("other");

        bus.publish(
            topic::PERSIST_SEQNO_CHANGED,
            BusEvent::PersistSeqNoChanged(PersistSeqNo { vb_id: 1, seq_no: 1 }),
        );

        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
