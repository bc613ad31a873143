//! Reference replicated document
//!
//! A string-keyed LWW map backed by an [`OpStore`]. It implements
//! [`SyncDocument`], so it can be handed directly to a
//! [`SyncProvider`](crate::core_sync::SyncProvider).
//!
//! Updates on the wire are bincode-encoded operation lists; state vectors are
//! bincode-encoded [`StateVector`]s.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::errors::DocResult;
use super::lww_map::{LwwMap, Stamp};
use super::op_store::{decode_ops, encode_ops, Op, OpId, OpStore};
use super::state_vector::{ClientId, StateVector};
use crate::core_doc::DocError;
use crate::core_sync::document::{
    Origin, SyncDocument, UpdateEvent, UpdateListener, UpdateObservers, UpdateSubscription,
};

struct DocState {
    client_id: ClientId,
    next_seq: u64,
    store: OpStore,
    map: LwwMap,
}

impl DocState {
    fn integrate(&mut self, op: Op) -> Option<Op> {
        if self.store.contains(&op.id) {
            return None;
        }
        let stamp = Stamp { lamport: op.lamport, client: op.id.client };
        self.map.apply(&op.key, op.value.clone(), stamp);
        if op.id.client == self.client_id {
            self.next_seq = self.next_seq.max(op.id.seq.saturating_add(1));
        }
        self.store.insert(op.clone());
        Some(op)
    }
}

pub struct ReplicatedDoc {
    state: Mutex<DocState>,
    observers: UpdateObservers,
}

impl ReplicatedDoc {
    /// Create an empty document with a random client id
    pub fn new() -> Self {
        Self::with_client_id(Uuid::new_v4().as_u128() as u64)
    }

    pub fn with_client_id(client_id: ClientId) -> Self {
        Self {
            state: Mutex::new(DocState {
                client_id,
                next_seq: 1,
                store: OpStore::new(),
                map: LwwMap::new(),
            }),
            observers: UpdateObservers::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DocState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn client_id(&self) -> ClientId {
        self.lock().client_id
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> DocResult<()> {
        self.write(key.into(), Some(value.into()), None)
    }

    pub fn set_with_origin(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        origin: Origin,
    ) -> DocResult<()> {
        self.write(key.into(), Some(value.into()), Some(origin))
    }

    pub fn remove(&self, key: impl Into<String>) -> DocResult<()> {
        self.write(key.into(), None, None)
    }

    pub fn remove_with_origin(&self, key: impl Into<String>, origin: Origin) -> DocResult<()> {
        self.write(key.into(), None, Some(origin))
    }

    fn write(&self, key: String, value: Option<String>, origin: Option<Origin>) -> DocResult<()> {
        let update = {
            let mut state = self.lock();
            let lamport = state
                .store
                .max_lamport()
                .checked_add(1)
                .filter(|l| *l < u64::MAX)
                .ok_or_else(|| DocError::Encode("lamport clock exhausted".to_string()))?;
            if state.next_seq == u64::MAX {
                return Err(DocError::Encode("sequence numbers exhausted".to_string()));
            }
            let op = Op {
                id: OpId { client: state.client_id, seq: state.next_seq },
                lamport,
                key,
                value,
            };
            let op = state
                .integrate(op)
                .ok_or_else(|| DocError::Encode("local operation id reused".to_string()))?;
            encode_ops(&[op])?
        };
        // Listeners run outside the state lock so they may read the document.
        self.observers.notify(&UpdateEvent { update, origin });
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().map.get(key).map(str::to_string)
    }

    /// Visible contents of the document
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.lock().map.snapshot()
    }

    pub fn state_vector(&self) -> StateVector {
        self.lock().store.state_vector().clone()
    }

    /// Number of operations held, including overwritten ones
    pub fn op_count(&self) -> usize {
        self.lock().store.len()
    }

    /// Encode the whole document as a single update
    pub fn encode_state_as_update(&self) -> DocResult<Vec<u8>> {
        let ops = self.lock().store.ops_since(&StateVector::new());
        encode_ops(&ops)
    }
}

impl Default for ReplicatedDoc {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncDocument for ReplicatedDoc {
    fn encode_state_vector(&self) -> Result<Vec<u8>, DocError> {
        self.lock().store.state_vector().encode()
    }

    fn encode_diff(&self, state_vector: &[u8]) -> Result<Option<Vec<u8>>, DocError> {
        let remote = StateVector::decode(state_vector)?;
        let missing = self.lock().store.ops_since(&remote);
        if missing.is_empty() {
            return Ok(None);
        }
        encode_ops(&missing).map(Some)
    }

    fn apply_update(&self, update: &[u8], origin: Option<Origin>) -> Result<(), DocError> {
        let ops = decode_ops(update)?;
        let applied: Vec<Op> = {
            let mut state = self.lock();
            ops.into_iter().filter_map(|op| state.integrate(op)).collect()
        };
        if applied.is_empty() {
            return Ok(());
        }
        let update = encode_ops(&applied)?;
        self.observers.notify(&UpdateEvent { update, origin });
        Ok(())
    }

    fn observe_updates(&self, listener: UpdateListener) -> UpdateSubscription {
        self.observers.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn recorder(doc: &ReplicatedDoc) -> (Arc<StdMutex<Vec<UpdateEvent>>>, UpdateSubscription) {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        let sub = doc.observe_updates(Arc::new(move |e: &UpdateEvent| {
            sink.lock().unwrap().push(e.clone());
        }));
        (events, sub)
    }

    #[test]
    fn test_local_write_notifies_without_origin() {
        let doc = ReplicatedDoc::with_client_id(1);
        let (events, _sub) = recorder(&doc);

        doc.set("title", "hello").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, None);
        assert_eq!(doc.get("title").as_deref(), Some("hello"));
    }

    #[test]
    fn test_remote_apply_carries_origin() {
        let a = ReplicatedDoc::with_client_id(1);
        let b = ReplicatedDoc::with_client_id(2);
        a.set("k", "v").unwrap();

        let (events, _sub) = recorder(&b);
        let update = a.encode_state_as_update().unwrap();
        b.apply_update(&update, Some(Origin::new("net"))).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].origin, Some(Origin::new("net")));
        assert_eq!(b.snapshot(), a.snapshot());
    }

    #[test]
    fn test_duplicate_apply_is_silent_and_idempotent() {
        let a = ReplicatedDoc::with_client_id(1);
        let b = ReplicatedDoc::with_client_id(2);
        a.set("k", "v").unwrap();
        let update = a.encode_state_as_update().unwrap();

        b.apply_update(&update, None).unwrap();
        let after_once = b.snapshot();
        let (events, _sub) = recorder(&b);
        b.apply_update(&update, None).unwrap();

        assert_eq!(b.snapshot(), after_once);
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(b.op_count(), 1);
    }

    #[test]
    fn test_diff_against_own_state_vector_is_none() {
        let doc = ReplicatedDoc::with_client_id(1);
        doc.set("k", "v").unwrap();
        let sv = doc.encode_state_vector().unwrap();
        assert_eq!(doc.encode_diff(&sv).unwrap(), None);
    }

    #[test]
    fn test_diff_contains_exactly_missing_ops() {
        let a = ReplicatedDoc::with_client_id(1);
        let b = ReplicatedDoc::with_client_id(2);
        a.set("x", "1").unwrap();
        b.apply_update(&a.encode_state_as_update().unwrap(), None).unwrap();
        a.set("y", "2").unwrap();

        let diff = a.encode_diff(&b.encode_state_vector().unwrap()).unwrap().unwrap();
        let ops = decode_ops(&diff).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].key, "y");
    }

    #[test]
    fn test_remote_write_advances_lamport() {
        let a = ReplicatedDoc::with_client_id(1);
        let b = ReplicatedDoc::with_client_id(2);
        b.set("k", "b1").unwrap();
        b.set("k", "b2").unwrap();
        a.apply_update(&b.encode_state_as_update().unwrap(), None).unwrap();

        // A's write happens after seeing B's, so it must win everywhere.
        a.set("k", "a").unwrap();
        b.apply_update(&a.encode_state_as_update().unwrap(), None).unwrap();
        assert_eq!(a.get("k").as_deref(), Some("a"));
        assert_eq!(b.get("k").as_deref(), Some("a"));
    }

    #[test]
    fn test_remove_is_replicated() {
        let a = ReplicatedDoc::with_client_id(1);
        let b = ReplicatedDoc::with_client_id(2);
        a.set("k", "v").unwrap();
        a.remove("k").unwrap();
        b.apply_update(&a.encode_state_as_update().unwrap(), None).unwrap();
        assert_eq!(b.get("k"), None);
    }

    #[test]
    fn test_malformed_update_rejected() {
        let doc = ReplicatedDoc::new();
        assert!(matches!(doc.apply_update(&[1, 2, 3], None), Err(DocError::Decode(_))));
        assert!(matches!(doc.encode_diff(&[9]), Err(DocError::Decode(_))));
    }

    fn raw_update(client: ClientId, seq: u64, lamport: u64) -> Vec<u8> {
        let op = Op {
            id: OpId { client, seq },
            lamport,
            key: "k".to_string(),
            value: Some("remote".to_string()),
        };
        encode_ops(&[op]).unwrap()
    }

    #[test]
    fn test_extreme_remote_clocks_are_rejected() {
        let doc = ReplicatedDoc::with_client_id(1);
        assert!(matches!(
            doc.apply_update(&raw_update(2, 1, u64::MAX), None),
            Err(DocError::Decode(_))
        ));
        assert!(matches!(
            doc.apply_update(&raw_update(1, u64::MAX, 1), None),
            Err(DocError::Decode(_))
        ));
        assert_eq!(doc.op_count(), 0);

        doc.set("local", "edit").unwrap();
        assert_eq!(doc.get("local").as_deref(), Some("edit"));
    }

    #[test]
    fn test_exhausted_clocks_fail_local_writes() {
        let doc = ReplicatedDoc::with_client_id(1);
        doc.apply_update(&raw_update(2, 1, u64::MAX - 2), None).unwrap();
        doc.set("a", "1").unwrap();
        assert!(matches!(doc.set("b", "2"), Err(DocError::Encode(_))));
        assert_eq!(doc.get("b"), None);

        let own = ReplicatedDoc::with_client_id(1);
        own.apply_update(&raw_update(1, u64::MAX - 1, 1), None).unwrap();
        assert!(matches!(own.set("b", "2"), Err(DocError::Encode(_))));
        assert_eq!(own.get("k").as_deref(), Some("remote"));
    }

    #[test]
    fn test_diff_for_saturated_state_vector() {
        let doc = ReplicatedDoc::with_client_id(1);
        doc.set("k", "v").unwrap();
        let mut remote = StateVector::new();
        remote.set(1, u64::MAX);
        assert_eq!(doc.encode_diff(&remote.encode().unwrap()).unwrap(), None);
    }

    proptest! {
        #[test]
        fn prop_apply_order_does_not_matter(
            edits in proptest::collection::vec((0u64..3, 0u8..4, 0u8..10), 1..20)
        ) {
            let writers: Vec<ReplicatedDoc> =
                (1..=3).map(ReplicatedDoc::with_client_id).collect();
            let mut updates = Vec::new();
            let (events, subs): (Vec<_>, Vec<_>) = writers.iter().map(recorder).unzip();
            for (writer, key, value) in &edits {
                writers[*writer as usize]
                    .set(format!("k{}", key), format!("v{}", value))
                    .unwrap();
            }
            drop(subs);
            for log in &events {
                updates.extend(log.lock().unwrap().iter().map(|e| e.update.clone()));
            }

            let forward = ReplicatedDoc::with_client_id(10);
            for u in &updates {
                forward.apply_update(u, None).unwrap();
            }
            let backward = ReplicatedDoc::with_client_id(11);
            for u in updates.iter().rev() {
                backward.apply_update(u, None).unwrap();
                backward.apply_update(u, None).unwrap();
            }

            prop_assert_eq!(forward.snapshot(), backward.snapshot());
            prop_assert_eq!(forward.state_vector(), backward.state_vector());
        }
    }
}
