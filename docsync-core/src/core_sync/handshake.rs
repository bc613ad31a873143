//! Three-message sync handshake
//!
//! A step-1 carries the sender's state vector and is answered with a
//! step-2 holding exactly what the sender lacks. Updates carry incremental
//! local changes. Remote changes are applied under this provider's origin
//! tag so the resulting change notification is not broadcast back out.

use tracing::{debug, trace, warn};

use super::codec::{ProtocolMessage, SyncMessage};
use super::document::UpdateEvent;
use super::errors::SyncResult;
use super::message::{InstanceId, Target};
use super::state::ProviderCore;

impl ProviderCore {
    /// Send our state vector, asking `target` for whatever we are missing
    pub async fn send_step1(&self, target: Target) -> SyncResult<()> {
        let state_vector = self.document.encode_state_vector()?;
        trace!(
            document = %self.document_id,
            instance = %self.instance_id,
            target = %target,
            message_size = state_vector.len(),
            "Sending sync step 1"
        );
        self.publish(target, &ProtocolMessage::Sync(SyncMessage::Step1(state_vector))).await
    }

    pub(crate) async fn handle_sync(&self, sender: InstanceId, message: SyncMessage) -> SyncResult<()> {
        match message {
            SyncMessage::Step1(state_vector) => {
                self.peers.write().await.mark_synced(sender);
                self.refresh_peer_gauge().await;

                let Some(diff) = self.document.encode_diff(&state_vector)? else {
                    trace!(
                        document = %self.document_id,
                        instance = %self.instance_id,
                        sender = %sender,
                        "Peer is up to date, skipping sync step 2"
                    );
                    return Ok(());
                };

                let reply = ProtocolMessage::Sync(SyncMessage::Step2(diff));
                if let Err(e) = self.publish(Target::Peer(sender), &reply).await {
                    warn!(
                        document = %self.document_id,
                        instance = %self.instance_id,
                        target = %sender,
                        error = %e,
                        "Failed to send sync step 2"
                    );
                }
                Ok(())
            }
            SyncMessage::Step2(update) => {
                self.document.apply_update(&update, Some(self.origin.clone()))?;
                self.peers.write().await.mark_synced(sender);
                self.refresh_peer_gauge().await;
                trace!(
                    document = %self.document_id,
                    instance = %self.instance_id,
                    sender = %sender,
                    message_size = update.len(),
                    "Applied sync step 2"
                );
                Ok(())
            }
            SyncMessage::Update(update) => {
                self.document.apply_update(&update, Some(self.origin.clone()))?;
                trace!(
                    document = %self.document_id,
                    instance = %self.instance_id,
                    sender = %sender,
                    message_size = update.len(),
                    "Applied update"
                );
                Ok(())
            }
        }
    }

    /// Broadcast a document change to every synced peer, unless this
    /// provider applied it. Returns the number of successful publishes.
    pub async fn handle_local_update(&self, event: UpdateEvent) -> usize {
        if event.origin.as_ref() == Some(&self.origin) {
            trace!(
                document = %self.document_id,
                instance = %self.instance_id,
                "Ignoring update applied by this provider"
            );
            return 0;
        }

        let recipients = self.peers.read().await.recipients();
        if recipients.is_empty() {
            debug!(
                document = %self.document_id,
                instance = %self.instance_id,
                "No synced peers for local update"
            );
            return 0;
        }

        let payload = ProtocolMessage::Sync(SyncMessage::Update(event.update));
        self.fan_out(&recipients, &payload).await.sent
    }
}
