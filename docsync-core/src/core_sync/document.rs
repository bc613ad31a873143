/*
    document.rs - The CRDT document seam

    The provider never merges state itself. It needs a document that can:
    - encode its state vector (sync step 1)
    - compute the updates a peer is missing (sync step 2)
    - apply remote updates tagged with an origin
    - notify listeners of every change, together with the change's origin

    Loop prevention depends on the last point: remote updates are applied
    with the provider's own origin tag, and the provider skips any change
    notification carrying that tag.
*/

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::message::InstanceId;
use crate::core_doc::DocError;

/// Opaque marker attached to a document transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Tag used by a provider instance for updates it received from the network
    pub fn provider(instance: InstanceId) -> Self {
        Self(format!("provider:{}", instance))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A committed change: the encoded update plus the transaction origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub update: Vec<u8>,
    pub origin: Option<Origin>,
}

pub type UpdateListener = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

type ListenerList = Mutex<Vec<(u64, UpdateListener)>>;

fn lock(list: &ListenerList) -> MutexGuard<'_, Vec<(u64, UpdateListener)>> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of change listeners, shared by document implementations
#[derive(Default)]
pub struct UpdateObservers {
    next_id: AtomicU64,
    listeners: Arc<ListenerList>,
}

impl UpdateObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: UpdateListener) -> UpdateSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, listener));
        UpdateSubscription { id, listeners: Arc::downgrade(&self.listeners) }
    }

    /// Invoke every listener synchronously. The registry lock is released
    /// before listeners run so they may subscribe or unsubscribe.
    pub fn notify(&self, event: &UpdateEvent) {
        let listeners: Vec<UpdateListener> =
            lock(&self.listeners).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deregistration handle returned by [`SyncDocument::observe_updates`].
/// The listener is removed when this is dropped.
#[must_use = "dropping the subscription removes the listener"]
pub struct UpdateSubscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl UpdateSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for UpdateSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for UpdateSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateSubscription").field("id", &self.id).finish()
    }
}

/// Replicated document consumed by the sync provider
pub trait SyncDocument: Send + Sync {
    /// Encode the local state vector
    fn encode_state_vector(&self) -> Result<Vec<u8>, DocError>;

    /// Encode everything the holder of `state_vector` is missing.
    /// Returns `None` when there is nothing to send.
    fn encode_diff(&self, state_vector: &[u8]) -> Result<Option<Vec<u8>>, DocError>;

    /// Apply a remote update inside a transaction tagged with `origin`
    fn apply_update(&self, update: &[u8], origin: Option<Origin>) -> Result<(), DocError>;

    /// Register a change listener
    fn observe_updates(&self, listener: UpdateListener) -> UpdateSubscription;
}
