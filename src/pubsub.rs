//! Publish/Subscribe Registry
//!
//! Maps channel names to subscriber sinks, independent of the keyspace.
//! A sink is just a byte channel: the owning front-end forwards delivered
//! frames to its socket and tears the sink down when the connection closes.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Identifies one subscriber across every channel it joins. Front-ends
/// allocate one id per connection via [`PubSub::next_id`].
pub type SubscriberId = u64;

/// Where published frames are delivered. Sending may fail; failures are
/// swallowed and the sink stays registered until its owner removes it.
pub type Sink = mpsc::UnboundedSender<Bytes>;

/// Channel registry. Both levels are concurrent maps so subscribe and
/// publish never serialise against each other.
#[derive(Debug, Default)]
pub struct PubSub {
    channels: DashMap<String, DashMap<SubscriberId, Sink>>,
    next_id: AtomicU64,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a subscriber id for a new connection.
    pub fn next_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register `sink` under `channel`. Subscribing the same id to the same
    /// channel again just replaces the sink; it never duplicates delivery.
    pub fn subscribe(&self, channel: &str, id: SubscriberId, sink: Sink) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(id, sink);
    }

    /// Drop `id` from every channel. Called by the owning front-end when the
    /// connection closes or errors.
    pub fn unsubscribe_all(&self, id: SubscriberId) {
        for entry in self.channels.iter() {
            entry.value().remove(&id);
        }
    }

    /// Deliver `MESSAGE <channel> <message>\n` to every sink on `channel`.
    ///
    /// Returns the number of sinks registered at fan-out time. Delivery is
    /// best-effort: a sink whose receiver is gone is counted and skipped.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        let subscribers = match self.channels.get(channel) {
            Some(s) => s,
            None => return 0,
        };

        let frame = Bytes::from(format!("MESSAGE {channel} {message}\n"));
        let mut count = 0;
        for sink in subscribers.iter() {
            let _ = sink.value().send(frame.clone());
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_exact_frames() {
        let pubsub = PubSub::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (tx, rx) = mpsc::unbounded_channel();
            pubsub.subscribe("news", pubsub.next_id(), tx);
            receivers.push(rx);
        }

        assert_eq!(pubsub.publish("news", "hello world"), 3);
        for rx in &mut receivers {
            assert_eq!(
                rx.try_recv().unwrap(),
                Bytes::from_static(b"MESSAGE news hello world\n")
            );
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let pubsub = PubSub::new();
        assert_eq!(pubsub.publish("empty", "msg"), 0);
    }

    #[test]
    fn test_resubscribe_is_idempotent() {
        let pubsub = PubSub::new();
        let id = pubsub.next_id();
        let (tx, mut rx) = mpsc::unbounded_channel();

        pubsub.subscribe("c", id, tx.clone());
        pubsub.subscribe("c", id, tx);

        assert_eq!(pubsub.publish("c", "once"), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dead_sink_is_swallowed() {
        let pubsub = PubSub::new();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();

        pubsub.subscribe("c", pubsub.next_id(), dead_tx);
        pubsub.subscribe("c", pubsub.next_id(), live_tx);

        // Both sinks are still registered, so both count.
        assert_eq!(pubsub.publish("c", "m"), 2);
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_unsubscribe_all_channels() {
        let pubsub = PubSub::new();
        let id = pubsub.next_id();
        let (tx, _rx) = mpsc::unbounded_channel();

        pubsub.subscribe("a", id, tx.clone());
        pubsub.subscribe("b", id, tx);
        pubsub.unsubscribe_all(id);

        assert_eq!(pubsub.publish("a", "m"), 0);
        assert_eq!(pubsub.publish("b", "m"), 0);
    }
}
