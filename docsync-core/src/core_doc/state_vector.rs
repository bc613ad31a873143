/*
    state_vector.rs - Per-client progress summary

    Maps every client that ever wrote to the document to the highest
    sequence number this replica holds *contiguously* from 1. Two replicas
    exchange state vectors to work out exactly which operations the other
    one is missing.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::errors::{DocError, DocResult};

/// Document client identifier
pub type ClientId = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateVector {
    clocks: BTreeMap<ClientId, u64>,
}

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest contiguous sequence held for a client (0 if none)
    pub fn get(&self, client: ClientId) -> u64 {
        self.clocks.get(&client).copied().unwrap_or(0)
    }

    pub fn set(&mut self, client: ClientId, seq: u64) {
        if seq == 0 {
            self.clocks.remove(&client);
        } else {
            self.clocks.insert(client, seq);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn encode(&self) -> DocResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| DocError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> DocResult<Self> {
        bincode::deserialize(bytes).map_err(|e| DocError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_client() {
        let sv = StateVector::new();
        assert_eq!(sv.get(42), 0);
    }

    #[test]
    fn test_set_zero_removes() {
        let mut sv = StateVector::new();
        sv.set(1, 3);
        assert_eq!(sv.len(), 1);
        sv.set(1, 0);
        assert!(sv.is_empty());
    }

    #[test]
    fn test_encode_round_trip() {
        let mut sv = StateVector::new();
        sv.set(1, 3);
        sv.set(u64::MAX, u64::MAX);
        assert_eq!(StateVector::decode(&sv.encode().unwrap()).unwrap(), sv);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(StateVector::decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
