/*
    fanout.rs - Semaphore-gated publish dispatcher

    Sends one message per recipient with at most `limit` publishes in
    flight. Failures are collected, never retried: periodic resync heals
    whatever a failed publish missed.
*/

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::errors::SyncError;
use super::message::{Message, Target};
use super::transport::PubSub;

/// Default ceiling on simultaneous outbound publishes
pub const DEFAULT_FANOUT_CONCURRENCY: usize = 5;

/// Outcome of one fan-out
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub sent: usize,
    pub failed: Vec<(Target, SyncError)>,
}

impl FanOutReport {
    pub fn attempted(&self) -> usize {
        self.sent + self.failed.len()
    }
}

#[derive(Debug, Clone)]
pub struct FanOut {
    limit: usize,
    permits: Arc<Semaphore>,
}

impl FanOut {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self { limit, permits: Arc::new(Semaphore::new(limit)) }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Publish every message and wait for all of them to settle
    pub async fn publish_all(
        &self,
        transport: &Arc<dyn PubSub>,
        messages: Vec<Message>,
    ) -> FanOutReport {
        let mut report = FanOutReport::default();
        if messages.is_empty() {
            return report;
        }

        let mut tasks = JoinSet::new();
        for message in messages {
            let transport = transport.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let target = message.target_id;
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| (target, SyncError::Internal(e.to_string())))?;
                transport.publish(message).await.map_err(|e| (target, e))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => report.sent += 1,
                Ok(Err(failure)) => report.failed.push(failure),
                Err(e) => report
                    .failed
                    .push((Target::Broadcast, SyncError::Internal(e.to_string()))),
            }
        }
        report
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_FANOUT_CONCURRENCY)
    }
}
