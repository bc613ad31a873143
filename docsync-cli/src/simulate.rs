//! In-process simulation of several providers sharing one channel

use anyhow::{ensure, Result};
use docsync_core::config::ProviderConfig;
use docsync_core::core_doc::ReplicatedDoc;
use docsync_core::core_sync::{ChannelStats, InstanceId, MemoryHub, SyncProvider};
use docsync_core::health::{HealthChecker, HealthStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

const CHANNEL: &str = "docsync-simulation";
const DOCUMENT: &str = "simulated-doc";
const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub peers: usize,
    pub edits: usize,
    pub drop_rate: f64,
    pub duplicate: bool,
    pub rounds: u32,
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct PeerReport {
    pub instance: InstanceId,
    pub synced_peers: usize,
    pub health: HealthStatus,
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub converged: bool,
    /// No provider was unhealthy when the run settled
    pub ready: bool,
    pub elapsed: Duration,
    pub keys: usize,
    pub stats: ChannelStats,
    pub peers: Vec<PeerReport>,
}

struct Node {
    doc: Arc<ReplicatedDoc>,
    provider: SyncProvider,
}

fn converged(nodes: &[Node]) -> bool {
    let mut states = nodes.iter().map(|n| n.doc.snapshot());
    match states.next() {
        Some(first) => states.all(|s| s == first),
        None => true,
    }
}

pub async fn run(config: &ProviderConfig, options: &SimulationOptions) -> Result<SimulationReport> {
    ensure!(options.peers > 0, "at least one peer is required");
    ensure!(
        (0.0..=1.0).contains(&options.drop_rate),
        "drop rate must be between 0 and 1"
    );

    let hub = MemoryHub::new();
    hub.set_duplicate(CHANNEL, options.duplicate);
    if options.drop_rate > 0.0 {
        let rng = Mutex::new(StdRng::seed_from_u64(options.seed));
        let rate = options.drop_rate;
        hub.set_drop_filter(CHANNEL, move |_| {
            rng.lock().map(|mut rng| rng.gen_bool(rate)).unwrap_or(false)
        });
    }

    let nodes: Vec<Node> = (1..=options.peers as u64)
        .map(|client| {
            let doc = Arc::new(ReplicatedDoc::with_client_id(client));
            let provider = SyncProvider::new(
                DOCUMENT,
                doc.clone(),
                0,
                Arc::new(hub.channel(CHANNEL)),
                config.clone(),
            );
            Node { doc, provider }
        })
        .collect();

    let started = Instant::now();
    for node in &nodes {
        node.provider.connect().await?;
    }

    let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(1));
    for edit in 0..options.edits {
        for (i, node) in nodes.iter().enumerate() {
            node.doc.set(format!("peer{}/item{}", i, edit), rng.gen::<u32>().to_string())?;
            if rng.gen_bool(0.2) {
                node.doc.set("shared", format!("peer{}", i))?;
            }
        }
        tokio::task::yield_now().await;
    }
    debug!(edits = options.edits * options.peers, "Local edits applied");

    let deadline = started + config.resync_interval * options.rounds.max(1) + config.resync_interval / 2;
    while !converged(&nodes) && Instant::now() < deadline {
        tokio::time::sleep(POLL).await;
    }
    let converged = converged(&nodes);
    let elapsed = started.elapsed();
    info!(converged, elapsed_ms = elapsed.as_millis() as u64, "Simulation settled");

    let checker = HealthChecker::new(env!("CARGO_PKG_VERSION"));
    let mut peers = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let instance = node.provider.instance_id();
        let health = checker
            .observe_provider(&instance.to_string(), &node.provider, nodes.len() - 1)
            .await;
        peers.push(PeerReport {
            instance,
            synced_peers: node.provider.synced_peers().await.len(),
            health,
        });
    }

    let ready = checker.readiness_check().await;

    for node in &nodes {
        node.provider.disconnect().await?;
    }

    Ok(SimulationReport {
        converged,
        ready,
        elapsed,
        keys: nodes[0].doc.snapshot().len(),
        stats: hub.stats(CHANNEL),
        peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> ProviderConfig {
        ProviderConfig {
            resync_interval: Duration::from_secs(1),
            ping_interval: Duration::from_secs(1),
            fanout_concurrency: 5,
        }
    }

    fn options(peers: usize) -> SimulationOptions {
        SimulationOptions { peers, edits: 5, drop_rate: 0.0, duplicate: false, rounds: 3, seed: 7 }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_converges() {
        let report = run(&fast(), &options(4)).await.unwrap();
        assert!(report.converged);
        assert!(report.ready);
        assert_eq!(report.peers.len(), 4);
        assert!(report.keys >= 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_with_faults_converges() {
        let opts = SimulationOptions { drop_rate: 0.2, duplicate: true, rounds: 10, ..options(3) };
        let report = run(&fast(), &opts).await.unwrap();
        assert!(report.converged);
        assert!(report.stats.dropped > 0);
    }

    #[tokio::test]
    async fn test_rejects_bad_options() {
        assert!(run(&fast(), &options(0)).await.is_err());
        let opts = SimulationOptions { drop_rate: 1.5, ..options(2) };
        assert!(run(&fast(), &opts).await.is_err());
    }
}
