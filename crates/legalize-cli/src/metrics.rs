//! Prometheus export for the channel metrics.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Install the Prometheus exporter and describe the channel metrics.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    legalize_core::metrics::describe();

    info!("Metrics server listening on {}", addr);
    Ok(())
}
