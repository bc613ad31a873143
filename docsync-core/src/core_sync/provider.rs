/*
    provider.rs - SyncProvider facade and its event loop

    connect() subscribes, broadcasts a step 1 and spawns a task that owns
    the subscription, the local-change listener and both timers:

      inbound message  -> ProviderCore::dispatch
      local change     -> ProviderCore::handle_local_update
      resync interval  -> broadcast step 1 (fixed period)
      ping sleep       -> ProviderCore::ping_sweep, re-armed after it completes

    The task handles one event at a time. disconnect() signals it and waits
    for it to finish tearing down.
*/

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::document::{SyncDocument, UpdateEvent, UpdateSubscription};
use super::errors::{SyncError, SyncResult};
use super::message::{DocumentId, InstanceId, Target};
use super::peers::PeerRecord;
use super::state::ProviderCore;
use super::transport::{PubSub, Subscription};
use crate::config::ProviderConfig;
use crate::metrics;

struct Connection {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<SyncResult<()>>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Keeps one replicated document in sync with every other provider on
/// the same transport channel.
pub struct SyncProvider {
    core: Arc<ProviderCore>,
    config: ProviderConfig,
    connection: Mutex<Option<Connection>>,
}

impl SyncProvider {
    pub fn new(
        document_id: impl Into<DocumentId>,
        document: Arc<dyn SyncDocument>,
        epoch: u64,
        transport: Arc<dyn PubSub>,
        config: ProviderConfig,
    ) -> Self {
        Self::with_instance_id(
            document_id,
            InstanceId::generate(),
            document,
            epoch,
            transport,
            config,
        )
    }

    pub fn with_instance_id(
        document_id: impl Into<DocumentId>,
        instance_id: InstanceId,
        document: Arc<dyn SyncDocument>,
        epoch: u64,
        transport: Arc<dyn PubSub>,
        config: ProviderConfig,
    ) -> Self {
        let core = ProviderCore::new(
            document_id.into(),
            instance_id,
            epoch,
            document,
            transport,
            config.fanout_concurrency,
        );
        Self { core: Arc::new(core), config, connection: Mutex::new(None) }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.core.instance_id()
    }

    pub fn document_id(&self) -> &DocumentId {
        self.core.document_id()
    }

    pub fn epoch(&self) -> u64 {
        self.core.epoch()
    }

    /// Connected and the event loop is still running
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.as_ref().is_some_and(Connection::is_alive)
    }

    /// Snapshot of the synced-peer table
    pub async fn synced_peers(&self) -> HashMap<InstanceId, PeerRecord> {
        self.core.synced_peers().await
    }

    pub async fn connect(&self) -> SyncResult<()> {
        let mut connection = self.connection.lock().await;
        match connection.take() {
            Some(live) if live.is_alive() => {
                *connection = Some(live);
                return Err(SyncError::AlreadyConnected);
            }
            Some(dead) => {
                self.reap(dead).await;
            }
            None => {}
        }

        let subscription = self.core.transport.subscribe().await?;
        if let Err(e) = self.core.send_step1(Target::Broadcast).await {
            if let Err(unsub) = self.core.transport.unsubscribe(subscription.id).await {
                warn!(error = %unsub, "Failed to release subscription after aborted connect");
            }
            return Err(e);
        }

        let (updates_tx, updates) = mpsc::unbounded_channel();
        let listener = self.core.document.observe_updates(Arc::new(move |event: &UpdateEvent| {
            // Closed only while the loop is tearing down
            let _ = updates_tx.send(event.clone());
        }));

        let (shutdown, shutdown_rx) = oneshot::channel();
        let event_loop = EventLoop {
            core: self.core.clone(),
            subscription,
            updates,
            listener,
            shutdown: shutdown_rx,
            resync_interval: self.config.resync_interval,
            ping_interval: self.config.ping_interval,
        };
        self.core.refresh_peer_gauge().await;
        let task = tokio::spawn(event_loop.run());
        *connection = Some(Connection { shutdown, task });

        info!(
            document = %self.core.document_id,
            instance = %self.core.instance_id,
            clock = self.core.epoch,
            "Sync provider connected"
        );
        Ok(())
    }

    pub async fn disconnect(&self) -> SyncResult<()> {
        let mut connection = self.connection.lock().await;
        let current = connection.take().ok_or(SyncError::NotConnected)?;
        if !current.is_alive() {
            return match self.reap(current).await {
                Some(e) => Err(e),
                None => Ok(()),
            };
        }

        let Connection { shutdown, task } = current;
        // The loop also stops if the receiver sees the sender dropped
        let _ = shutdown.send(());
        let result = task.await.map_err(|e| SyncError::Internal(e.to_string()))?;

        info!(
            document = %self.core.document_id,
            instance = %self.core.instance_id,
            "Sync provider disconnected"
        );
        result
    }

    /// Collect an event loop that stopped without being asked to
    async fn reap(&self, dead: Connection) -> Option<SyncError> {
        let err = match dead.task.await {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => e,
            Err(e) => SyncError::Internal(e.to_string()),
        };
        self.core.retract_peer_gauge();
        error!(
            document = %self.core.document_id,
            instance = %self.core.instance_id,
            error = %err,
            "Sync provider event loop terminated unexpectedly"
        );
        Some(err)
    }
}

impl std::fmt::Debug for SyncProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProvider").field("core", &self.core).finish_non_exhaustive()
    }
}

struct EventLoop {
    core: Arc<ProviderCore>,
    subscription: Subscription,
    updates: mpsc::UnboundedReceiver<UpdateEvent>,
    listener: UpdateSubscription,
    shutdown: oneshot::Receiver<()>,
    resync_interval: Duration,
    ping_interval: Duration,
}

impl EventLoop {
    async fn run(mut self) -> SyncResult<()> {
        let mut resync = time::interval_at(Instant::now() + self.resync_interval, self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ping = time::sleep(self.ping_interval);
        tokio::pin!(ping);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown => break,

                message = self.subscription.receiver.recv(), if inbound_open => match message {
                    Some(message) => {
                        self.core.dispatch(message).await;
                    }
                    None => {
                        warn!(
                            document = %self.core.document_id,
                            instance = %self.core.instance_id,
                            "Transport closed the subscription"
                        );
                        inbound_open = false;
                    }
                },

                Some(event) = self.updates.recv() => {
                    self.core.handle_local_update(event).await;
                }

                _ = resync.tick() => {
                    metrics::record_resync();
                    if let Err(e) = self.core.send_step1(Target::Broadcast).await {
                        warn!(
                            document = %self.core.document_id,
                            instance = %self.core.instance_id,
                            error = %e,
                            "Resync step 1 failed"
                        );
                    }
                }

                _ = &mut ping => {
                    let sweep = self.core.ping_sweep().await;
                    debug!(
                        document = %self.core.document_id,
                        instance = %self.core.instance_id,
                        evicted = sweep.evicted.len(),
                        pinged = sweep.pinged.len(),
                        "Ping sweep complete"
                    );
                    ping.as_mut().reset(Instant::now() + self.ping_interval);
                }
            }
        }

        // Timers are gone with the loop; detach from the document before
        // releasing the transport.
        drop(self.listener);
        self.core.retract_peer_gauge();
        self.core.transport.unsubscribe(self.subscription.id).await
    }
}
