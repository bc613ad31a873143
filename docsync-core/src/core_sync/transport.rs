//! Pub/Sub Transport Trait
//!
//! The provider talks to the outside world only through [`PubSub`]. One
//! transport instance is bound to one channel; every subscriber on that
//! channel sees every published message, including its own.
//!
//! [`MemoryHub`] is an in-process implementation used by tests and the
//! simulator. It round-trips messages through their byte encoding and
//! can duplicate or drop deliveries to exercise the filters.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::errors::{SyncError, SyncResult};
use super::message::Message;

/// Handle returned by [`PubSub::subscribe`], used to unsubscribe
pub type SubscriptionId = u64;

/// An active subscription: inbound messages arrive on `receiver`
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::UnboundedReceiver<Message>,
}

/// Publish/subscribe bridge for one document channel
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a message to every subscriber of the channel
    async fn publish(&self, message: Message) -> SyncResult<()>;

    /// Start receiving messages published on the channel
    async fn subscribe(&self) -> SyncResult<Subscription>;

    /// Stop delivering to a subscription. Unknown ids are an error.
    async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<()>;
}

type DropFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Default)]
struct ChannelState {
    subscribers: HashMap<SubscriptionId, mpsc::UnboundedSender<Message>>,
    duplicate: bool,
    drop_filter: Option<DropFilter>,
    stats: ChannelStats,
}

/// Delivery counters for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// In-process broker shared by every [`MemoryPubSub`] created from it
#[derive(Clone, Default)]
pub struct MemoryHub {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport bound to `channel`
    pub fn channel(&self, channel: impl Into<String>) -> MemoryPubSub {
        MemoryPubSub { hub: self.clone(), channel: channel.into() }
    }

    /// Deliver every message twice
    pub fn set_duplicate(&self, channel: &str, duplicate: bool) {
        self.lock().entry(channel.to_string()).or_default().duplicate = duplicate;
    }

    /// Silently discard messages for which `filter` returns true.
    /// The publisher still sees a successful publish.
    pub fn set_drop_filter<F>(&self, channel: &str, filter: F)
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.lock().entry(channel.to_string()).or_default().drop_filter = Some(Arc::new(filter));
    }

    pub fn clear_drop_filter(&self, channel: &str) {
        if let Some(state) = self.lock().get_mut(channel) {
            state.drop_filter = None;
        }
    }

    pub fn stats(&self, channel: &str) -> ChannelStats {
        self.lock().get(channel).map(|s| s.stats).unwrap_or_default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map(|s| s.subscribers.len()).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChannelState>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`PubSub`] over a [`MemoryHub`] channel
#[derive(Clone)]
pub struct MemoryPubSub {
    hub: MemoryHub,
    channel: String,
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, message: Message) -> SyncResult<()> {
        let bytes = message.to_bytes()?;
        let mut channels = self.hub.lock();
        let state = channels.entry(self.channel.clone()).or_default();
        state.stats.published += 1;

        if state.drop_filter.as_ref().is_some_and(|drop| drop(&message)) {
            state.stats.dropped += 1;
            return Ok(());
        }

        let copies = if state.duplicate { 2 } else { 1 };
        let mut delivered = 0;
        state.subscribers.retain(|_, sender| {
            for _ in 0..copies {
                let Ok(decoded) = Message::from_bytes(&bytes) else {
                    return true;
                };
                if sender.send(decoded).is_err() {
                    return false;
                }
                delivered += 1;
            }
            true
        });
        state.stats.delivered += delivered;
        Ok(())
    }

    async fn subscribe(&self) -> SyncResult<Subscription> {
        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.hub.lock().entry(self.channel.clone()).or_default().subscribers.insert(id, sender);
        Ok(Subscription { id, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<()> {
        self.hub
            .lock()
            .get_mut(&self.channel)
            .and_then(|state| state.subscribers.remove(&id))
            .map(|_| ())
            .ok_or_else(|| SyncError::Transport(format!("unknown subscription {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_sync::message::{DocumentId, InstanceId, Target};

    fn message(data: u8) -> Message {
        Message::new(DocumentId::new("doc"), vec![data], InstanceId::generate(), Target::Broadcast, 0)
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_including_publisher() {
        let hub = MemoryHub::new();
        let a = hub.channel("room");
        let b = hub.channel("room");
        let mut sub_a = a.subscribe().await.unwrap();
        let mut sub_b = b.subscribe().await.unwrap();

        a.publish(message(7)).await.unwrap();

        assert_eq!(sub_a.receiver.recv().await.unwrap().data, vec![7]);
        assert_eq!(sub_b.receiver.recv().await.unwrap().data, vec![7]);
        assert_eq!(hub.stats("room").delivered, 2);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let hub = MemoryHub::new();
        let a = hub.channel("one");
        let b = hub.channel("two");
        let mut sub_b = b.subscribe().await.unwrap();

        a.publish(message(1)).await.unwrap();

        assert!(sub_b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let hub = MemoryHub::new();
        let a = hub.channel("room");
        let mut sub = a.subscribe().await.unwrap();
        a.unsubscribe(sub.id).await.unwrap();

        a.publish(message(1)).await.unwrap();

        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(hub.subscriber_count("room"), 0);
        assert!(a.unsubscribe(sub.id).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_delivery() {
        let hub = MemoryHub::new();
        let a = hub.channel("room");
        let mut sub = a.subscribe().await.unwrap();
        hub.set_duplicate("room", true);

        a.publish(message(3)).await.unwrap();

        assert_eq!(sub.receiver.recv().await.unwrap().data, vec![3]);
        assert_eq!(sub.receiver.recv().await.unwrap().data, vec![3]);
    }

    #[tokio::test]
    async fn test_drop_filter() {
        let hub = MemoryHub::new();
        let a = hub.channel("room");
        let mut sub = a.subscribe().await.unwrap();
        hub.set_drop_filter("room", |m| m.data == vec![9]);

        a.publish(message(9)).await.unwrap();
        a.publish(message(1)).await.unwrap();

        assert_eq!(sub.receiver.recv().await.unwrap().data, vec![1]);
        assert_eq!(hub.stats("room").dropped, 1);

        hub.clear_drop_filter("room");
        a.publish(message(9)).await.unwrap();
        assert_eq!(sub.receiver.recv().await.unwrap().data, vec![9]);
    }

    #[tokio::test]
    async fn test_closed_receivers_are_pruned() {
        let hub = MemoryHub::new();
        let a = hub.channel("room");
        let sub = a.subscribe().await.unwrap();
        drop(sub);

        a.publish(message(1)).await.unwrap();

        assert_eq!(hub.subscriber_count("room"), 0);
    }
}
