//! Ping/pong liveness tracking
//!
//! Each sweep first evicts peers that never answered the previous ping,
//! then pings everyone left. A peer therefore survives as long as it
//! answers within one ping period.

use tracing::{trace, warn};

use super::codec::ProtocolMessage;
use super::message::{InstanceId, Target};
use super::state::ProviderCore;
use crate::metrics;

/// Result of one ping sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PingSweep {
    pub evicted: Vec<InstanceId>,
    pub pinged: Vec<InstanceId>,
    pub failed: usize,
}

impl ProviderCore {
    /// Evict unresponsive peers, then ping the rest
    pub async fn ping_sweep(&self) -> PingSweep {
        let (evicted, pinged) = {
            let mut peers = self.peers.write().await;
            let evicted = peers.evict_unresponsive();
            // Marked waiting before any ping leaves
            let pinged = peers.begin_ping_round();
            (evicted, pinged)
        };

        for peer in &evicted {
            trace!(
                document = %self.document_id,
                instance = %self.instance_id,
                peer = %peer,
                "Peer did not respond to ping in time, removing peer"
            );
        }
        metrics::record_evictions(evicted.len() as u64);
        self.refresh_peer_gauge().await;

        let report = self.fan_out(&pinged, &ProtocolMessage::Ping).await;
        PingSweep { evicted, pinged, failed: report.failed.len() }
    }

    pub(crate) async fn handle_ping(&self, sender: InstanceId) {
        if let Err(e) = self.publish(Target::Peer(sender), &ProtocolMessage::Pong).await {
            warn!(
                document = %self.document_id,
                instance = %self.instance_id,
                target = %sender,
                error = %e,
                "Failed to send pong"
            );
        }
    }

    pub(crate) async fn handle_pong(&self, sender: InstanceId) {
        let known = self.peers.write().await.record_pong(sender);
        trace!(
            document = %self.document_id,
            instance = %self.instance_id,
            sender = %sender,
            known,
            "Received pong"
        );
    }
}
