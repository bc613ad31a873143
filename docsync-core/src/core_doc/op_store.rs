/*
    op_store.rs - Append-only store of document operations

    Every write to the document is an immutable operation identified by
    (client, seq). The store:
    - ignores operations it already holds (idempotent apply)
    - keeps operations that arrive ahead of a gap, so out-of-order
      delivery never loses data
    - tracks the contiguous state vector and the highest Lamport time seen
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

use super::errors::{DocError, DocResult};
use super::state_vector::{ClientId, StateVector};

/// Unique identifier of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub client: ClientId,
    pub seq: u64,
}

/// A single key write. `value: None` is a delete (tombstone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Op {
    pub id: OpId,
    pub lamport: u64,
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct OpStore {
    ops: BTreeMap<ClientId, BTreeMap<u64, Op>>,
    state_vector: StateVector,
    max_lamport: u64,
}

impl OpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an operation. Returns false if it was already present.
    pub fn insert(&mut self, op: Op) -> bool {
        let client = op.id.client;
        let seq = op.id.seq;
        let per_client = self.ops.entry(client).or_default();
        if per_client.contains_key(&seq) {
            return false;
        }

        self.max_lamport = self.max_lamport.max(op.lamport);
        per_client.insert(seq, op);

        let mut contiguous = self.state_vector.get(client);
        while let Some(next) = contiguous.checked_add(1).filter(|n| per_client.contains_key(n)) {
            contiguous = next;
        }
        self.state_vector.set(client, contiguous);
        true
    }

    pub fn contains(&self, id: &OpId) -> bool {
        self.ops.get(&id.client).is_some_and(|ops| ops.contains_key(&id.seq))
    }

    /// Every operation not covered by `remote`, ordered by (client, seq)
    pub fn ops_since(&self, remote: &StateVector) -> Vec<Op> {
        self.ops
            .iter()
            .flat_map(|(&client, ops)| {
                let known = remote.get(client);
                ops.range((Bound::Excluded(known), Bound::Unbounded)).map(|(_, op)| op.clone())
            })
            .collect()
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state_vector
    }

    pub fn max_lamport(&self) -> u64 {
        self.max_lamport
    }

    pub fn len(&self) -> usize {
        self.ops.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn encode_ops(ops: &[Op]) -> DocResult<Vec<u8>> {
    bincode::serialize(ops).map_err(|e| DocError::Encode(e.to_string()))
}

/// Decode a remote operation list. Sequence numbers must lie in
/// `1..u64::MAX` and Lamport times below `u64::MAX`, so local clocks can
/// always advance past anything a peer sends.
pub fn decode_ops(bytes: &[u8]) -> DocResult<Vec<Op>> {
    let ops: Vec<Op> = bincode::deserialize(bytes).map_err(|e| DocError::Decode(e.to_string()))?;
    if let Some(op) = ops
        .iter()
        .find(|op| op.id.seq == 0 || op.id.seq == u64::MAX || op.lamport == u64::MAX)
    {
        return Err(DocError::Decode(format!(
            "operation {}:{} out of range (lamport {})",
            op.id.client, op.id.seq, op.lamport
        )));
    }
    Ok(ops)
}
