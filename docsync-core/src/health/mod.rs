//! Health reporting for sync providers

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

use crate::core_sync::SyncProvider;

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub timestamp: SystemTime,
    pub components: Vec<ComponentHealth>,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Component health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_check: SystemTime,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Healthy, None)
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(name, HealthStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(name: impl Into<String>, status: HealthStatus, message: Option<String>) -> Self {
        Self { name: name.into(), status, message, last_check: SystemTime::now() }
    }
}

/// Registry of component health; overall status is the worst component
pub struct HealthChecker {
    start_time: SystemTime,
    version: String,
    components: Arc<RwLock<Vec<ComponentHealth>>>,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            version: version.into(),
            components: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Insert or replace a component's health
    pub async fn report(&self, health: ComponentHealth) {
        let mut components = self.components.write().await;
        match components.iter_mut().find(|c| c.name == health.name) {
            Some(existing) => *existing = health,
            None => components.push(health),
        }
    }

    /// Check a provider and record the result under `name`
    pub async fn observe_provider(
        &self,
        name: &str,
        provider: &SyncProvider,
        min_peers: usize,
    ) -> HealthStatus {
        let connected = provider.is_connected().await;
        let peers = provider.synced_peers().await.len();
        let mut health = checks::check_sync_provider(connected, peers, min_peers);
        health.name = name.to_string();
        let status = health.status;
        self.report(health).await;
        status
    }

    pub async fn check_health(&self) -> HealthCheck {
        let components = self.components.read().await.clone();

        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        let uptime = self.start_time.elapsed().unwrap_or(Duration::ZERO).as_secs();

        HealthCheck {
            status,
            timestamp: SystemTime::now(),
            components,
            version: self.version.clone(),
            uptime_seconds: uptime,
        }
    }

    /// Can accept traffic
    pub async fn readiness_check(&self) -> bool {
        self.check_health().await.status != HealthStatus::Unhealthy
    }
}

/// Built-in health checks
pub mod checks {
    use super::*;

    /// Disconnected providers are unhealthy; too few synced peers is degraded
    pub fn check_sync_provider(
        connected: bool,
        synced_peers: usize,
        min_peers: usize,
    ) -> ComponentHealth {
        if !connected {
            ComponentHealth::unhealthy("sync_provider", "Provider is not connected")
        } else if synced_peers < min_peers {
            ComponentHealth::degraded(
                "sync_provider",
                format!("Only {} synced peers (minimum: {})", synced_peers, min_peers),
            )
        } else {
            ComponentHealth::healthy("sync_provider")
        }
    }
}
