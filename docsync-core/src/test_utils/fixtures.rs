//! Transport and replica fixtures

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ProviderConfig;
use crate::core_doc::ReplicatedDoc;
use crate::core_sync::{
    MemoryHub, Message, PubSub, Subscription, SubscriptionId, SyncError, SyncProvider, SyncResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport that records every publish and lets tests inject inbound traffic
#[derive(Default)]
pub struct RecordingPubSub {
    published: Mutex<Vec<Message>>,
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<Message>>>,
    next_id: AtomicU64,
    fail: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl RecordingPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<Message> {
        lock(&self.published).clone()
    }

    pub fn clear(&self) {
        lock(&self.published).clear();
    }

    /// Make every publish fail with a transport error
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribes(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Deliver `message` to every subscriber. Returns how many received it.
    pub fn inject(&self, message: Message) -> usize {
        lock(&self.subscribers)
            .values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

#[async_trait]
impl PubSub for RecordingPubSub {
    async fn publish(&self, message: Message) -> SyncResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected publish failure".to_string()));
        }
        lock(&self.published).push(message);
        Ok(())
    }

    async fn subscribe(&self) -> SyncResult<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SyncError::Transport("injected subscribe failure".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).insert(id, tx);
        Ok(Subscription { id, receiver })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> SyncResult<()> {
        lock(&self.subscribers)
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| SyncError::Transport(format!("unknown subscription {}", id)))
    }
}

/// Short timers for tests running on a paused clock
pub fn fast_provider_config() -> ProviderConfig {
    ProviderConfig {
        resync_interval: Duration::from_secs(5),
        ping_interval: Duration::from_secs(2),
        fanout_concurrency: 5,
    }
}

/// A document and the provider that syncs it
pub struct TestReplica {
    pub doc: Arc<ReplicatedDoc>,
    pub provider: SyncProvider,
}

impl TestReplica {
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.doc.snapshot()
    }
}

/// Build one replica on `channel` of `hub`
pub fn replica(
    hub: &MemoryHub,
    channel: &str,
    document: &str,
    epoch: u64,
    client_id: u64,
    config: ProviderConfig,
) -> TestReplica {
    let doc = Arc::new(ReplicatedDoc::with_client_id(client_id));
    let provider = SyncProvider::new(
        document,
        doc.clone(),
        epoch,
        Arc::new(hub.channel(channel)),
        config,
    );
    TestReplica { doc, provider }
}

/// `count` replicas of document "doc" at epoch 0, client ids 1..=count
pub fn cluster(hub: &MemoryHub, channel: &str, count: usize, config: ProviderConfig) -> Vec<TestReplica> {
    (1..=count as u64)
        .map(|client| replica(hub, channel, "doc", 0, client, config.clone()))
        .collect()
}

/// True when every replica holds the same document state
pub fn converged(replicas: &[TestReplica]) -> bool {
    let mut states = replicas.iter().map(TestReplica::snapshot);
    match states.next() {
        Some(first) => states.all(|state| state == first),
        None => true,
    }
}
