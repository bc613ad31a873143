//! Prometheus export

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to install Prometheus exporter: {0}")]
    InstallFailed(String),
}

/// Install the global recorder and serve `/metrics` on `addr`.
/// Must be called from within a tokio runtime.
pub fn install_prometheus_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;
    super::init_metrics();
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}
