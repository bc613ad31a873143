/*
    peers.rs - Table of peers known to be synchronized

    A peer enters (or is refreshed with waiting_pong = false) when it sends
    sync step 1 or sync step 2. A pong only refreshes a peer that is still
    present. A ping sweep first evicts every peer
    still waiting for a pong from the previous sweep, then marks the rest as
    waiting before pinging them.
*/

use serde::Serialize;
use std::collections::HashMap;

use super::message::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PeerRecord {
    pub waiting_pong: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncedPeerTable {
    peers: HashMap<InstanceId, PeerRecord>,
}

impl SyncedPeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer that just completed part of the handshake
    pub fn mark_synced(&mut self, peer: InstanceId) {
        self.peers.insert(peer, PeerRecord { waiting_pong: false });
    }

    /// Record a pong. Returns false for peers that are no longer tracked.
    pub fn record_pong(&mut self, peer: InstanceId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(record) => {
                record.waiting_pong = false;
                true
            }
            None => false,
        }
    }

    /// Remove every peer that did not answer the previous ping
    pub fn evict_unresponsive(&mut self) -> Vec<InstanceId> {
        let stale: Vec<InstanceId> = self
            .peers
            .iter()
            .filter(|(_, record)| record.waiting_pong)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in &stale {
            self.peers.remove(peer);
        }
        stale
    }

    /// Mark every remaining peer as waiting for a pong and return them
    pub fn begin_ping_round(&mut self) -> Vec<InstanceId> {
        self.peers
            .iter_mut()
            .map(|(peer, record)| {
                record.waiting_pong = true;
                *peer
            })
            .collect()
    }

    pub fn get(&self, peer: &InstanceId) -> Option<PeerRecord> {
        self.peers.get(peer).copied()
    }

    pub fn contains(&self, peer: &InstanceId) -> bool {
        self.peers.contains_key(peer)
    }

    /// Peers to fan out to, as of now
    pub fn recipients(&self) -> Vec<InstanceId> {
        self.peers.keys().copied().collect()
    }

    pub fn snapshot(&self) -> HashMap<InstanceId, PeerRecord> {
        self.peers.clone()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_synced_resets_waiting() {
        let mut table = SyncedPeerTable::new();
        let peer = InstanceId::generate();
        table.mark_synced(peer);
        table.begin_ping_round();
        assert_eq!(table.get(&peer), Some(PeerRecord { waiting_pong: true }));

        table.mark_synced(peer);
        assert_eq!(table.get(&peer), Some(PeerRecord { waiting_pong: false }));
    }

    #[test]
    fn test_pong_from_unknown_peer_is_noop() {
        let mut table = SyncedPeerTable::new();
        assert!(!table.record_pong(InstanceId::generate()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_eviction_only_removes_waiting_peers() {
        let mut table = SyncedPeerTable::new();
        let silent = InstanceId::generate();
        let alive = InstanceId::generate();
        table.mark_synced(silent);
        table.mark_synced(alive);

        table.begin_ping_round();
        table.record_pong(alive);

        let evicted = table.evict_unresponsive();
        assert_eq!(evicted, vec![silent]);
        assert!(table.contains(&alive));
        assert!(!table.contains(&silent));
    }

    #[test]
    fn test_begin_ping_round_marks_all() {
        let mut table = SyncedPeerTable::new();
        for _ in 0..3 {
            table.mark_synced(InstanceId::generate());
        }
        let pinged = table.begin_ping_round();
        assert_eq!(pinged.len(), 3);
        assert!(table.snapshot().values().all(|r| r.waiting_pong));
    }
}
