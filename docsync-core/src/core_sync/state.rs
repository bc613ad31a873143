/*
    state.rs - Provider state shared by the router, handshake and liveness handlers

    One ProviderCore exists per provider instance. The event loop owns it
    behind an Arc; the synced-peer table is additionally shared with the
    facade so callers can read it while the loop runs.
*/

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use super::codec::ProtocolMessage;
use super::document::{Origin, SyncDocument};
use super::errors::SyncResult;
use super::fanout::{FanOut, FanOutReport};
use super::message::{DocumentId, InstanceId, Message, Target};
use super::peers::{PeerRecord, SyncedPeerTable};
use super::transport::PubSub;
use crate::metrics;

pub struct ProviderCore {
    pub(crate) document_id: DocumentId,
    pub(crate) instance_id: InstanceId,
    pub(crate) epoch: u64,
    pub(crate) origin: Origin,
    pub(crate) document: Arc<dyn SyncDocument>,
    pub(crate) transport: Arc<dyn PubSub>,
    pub(crate) peers: Arc<RwLock<SyncedPeerTable>>,
    pub(crate) fanout: FanOut,
    /// Peer count last added to the synced-peer gauge
    reported_peers: AtomicUsize,
}

impl ProviderCore {
    pub fn new(
        document_id: DocumentId,
        instance_id: InstanceId,
        epoch: u64,
        document: Arc<dyn SyncDocument>,
        transport: Arc<dyn PubSub>,
        fanout_concurrency: usize,
    ) -> Self {
        Self {
            document_id,
            instance_id,
            epoch,
            origin: Origin::provider(instance_id),
            document,
            transport,
            peers: Arc::new(RwLock::new(SyncedPeerTable::new())),
            fanout: FanOut::new(fanout_concurrency),
            reported_peers: AtomicUsize::new(0),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Origin tag attached to every remote update this provider applies
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub async fn synced_peers(&self) -> HashMap<InstanceId, PeerRecord> {
        self.peers.read().await.snapshot()
    }

    pub(crate) fn envelope(&self, data: Vec<u8>, target: Target) -> Message {
        Message::new(self.document_id.clone(), data, self.instance_id, target, self.epoch)
    }

    /// Publish a single message and count it
    pub(crate) async fn publish(&self, target: Target, payload: &ProtocolMessage) -> SyncResult<()> {
        let message = self.envelope(payload.encode(), target);
        match self.transport.publish(message).await {
            Ok(()) => {
                metrics::record_sent(payload.kind(), 1);
                Ok(())
            }
            Err(e) => {
                metrics::record_publish_failures(1);
                Err(e)
            }
        }
    }

    /// Send one copy of `payload` to each recipient, bounded by the fan-out ceiling
    pub(crate) async fn fan_out(
        &self,
        recipients: &[InstanceId],
        payload: &ProtocolMessage,
    ) -> FanOutReport {
        let data = payload.encode();
        let messages = recipients
            .iter()
            .map(|peer| self.envelope(data.clone(), Target::Peer(*peer)))
            .collect();

        let report = self.fanout.publish_all(&self.transport, messages).await;

        for (target, error) in &report.failed {
            warn!(
                document = %self.document_id,
                instance = %self.instance_id,
                target = %target,
                message_type = payload.kind(),
                error = %error,
                "Failed to publish to peer"
            );
        }
        metrics::record_sent(payload.kind(), report.sent as u64);
        metrics::record_publish_failures(report.failed.len() as u64);
        report
    }

    pub(crate) async fn refresh_peer_gauge(&self) {
        let count = self.peers.read().await.len();
        let previous = self.reported_peers.swap(count, Ordering::Relaxed);
        metrics::adjust_synced_peers(self.document_id.as_str(), previous, count);
    }

    /// Remove this provider's peers from the gauge while it is disconnected
    pub(crate) fn retract_peer_gauge(&self) {
        let previous = self.reported_peers.swap(0, Ordering::Relaxed);
        metrics::adjust_synced_peers(self.document_id.as_str(), previous, 0);
    }
}

impl std::fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCore")
            .field("document_id", &self.document_id)
            .field("instance_id", &self.instance_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
