//! Metrics for the sync provider
//!
//! Thin helpers over the `metrics` facade. Nothing is recorded unless a
//! recorder is installed, e.g. with [`install_prometheus_exporter`].

use metrics::{counter, describe_counter, describe_gauge, gauge};

mod exporter;

pub use exporter::{install_prometheus_exporter, MetricsError};

pub const MESSAGES_RECEIVED: &str = "docsync.messages.received";
pub const MESSAGES_DROPPED: &str = "docsync.messages.dropped";
pub const MESSAGES_SENT: &str = "docsync.messages.sent";
pub const PUBLISH_FAILED: &str = "docsync.publish.failed";
pub const PEERS_EVICTED: &str = "docsync.peers.evicted";
pub const PEERS_SYNCED: &str = "docsync.peers.synced";
pub const RESYNCS: &str = "docsync.resyncs";

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!(MESSAGES_RECEIVED, "Messages delivered by the transport");
    describe_counter!(MESSAGES_DROPPED, "Messages discarded by the router, by reason");
    describe_counter!(MESSAGES_SENT, "Messages published, by protocol kind");
    describe_counter!(PUBLISH_FAILED, "Publishes the transport rejected");
    describe_counter!(PEERS_EVICTED, "Peers removed for missing a pong");
    describe_counter!(RESYNCS, "Periodic broadcast step-1 rounds");
    describe_gauge!(PEERS_SYNCED, "Current size of the synced-peer table");
}

pub fn record_received() {
    counter!(MESSAGES_RECEIVED).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!(MESSAGES_DROPPED, "reason" => reason).increment(1);
}

pub fn record_sent(kind: &'static str, count: u64) {
    if count > 0 {
        counter!(MESSAGES_SENT, "kind" => kind).increment(count);
    }
}

pub fn record_publish_failures(count: u64) {
    if count > 0 {
        counter!(PUBLISH_FAILED).increment(count);
    }
}

pub fn record_evictions(count: u64) {
    if count > 0 {
        counter!(PEERS_EVICTED).increment(count);
    }
}

pub fn record_resync() {
    counter!(RESYNCS).increment(1);
}

/// Move one provider's contribution to the per-document synced-peer gauge
/// from `previous` to `current`. Providers of the same document share a series.
pub fn adjust_synced_peers(document: &str, previous: usize, current: usize) {
    let gauge = gauge!(PEERS_SYNCED, "document" => document.to_string());
    if current > previous {
        gauge.increment((current - previous) as f64);
    } else if previous > current {
        gauge.decrement((previous - current) as f64);
    }
}
