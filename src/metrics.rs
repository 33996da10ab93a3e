use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::info;

/// Install the Prometheus recorder and return the handle used to render it
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        // Sink requests are bounded by the request timeout, so stop at 10s
        .set_buckets_for_metric(
            Matcher::Full("relay.sink.request_duration_ms".to_string()),
            &[
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ],
        )
        .context("Failed to set buckets for relay.sink.request_duration_ms")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Initialize relay metrics to zero so they appear before the first message
pub fn initialize_relay_metrics() {
    metrics::counter!("relay.messages.received_total").absolute(0);
    metrics::counter!("relay.messages.acked_total").absolute(0);
    metrics::counter!("relay.messages.rejected_total", "reason" => "decode").absolute(0);
    metrics::counter!("relay.messages.rejected_total", "reason" => "validation").absolute(0);
    metrics::counter!("relay.messages.requeued_total").absolute(0);

    metrics::counter!("relay.sink.attempts_total").absolute(0);
    metrics::counter!("relay.sink.failures_total").absolute(0);

    metrics::counter!("relay.settle.errors_total").absolute(0);
    metrics::counter!("relay.jetstream.receive_error_total").absolute(0);
    metrics::gauge!("relay.jetstream.connected").set(0.0);
}

/// Background task updating uptime and memory gauges every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs_f64());
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        if let Some(bytes) = resident_memory_bytes() {
            metrics::gauge!("process.memory.bytes").set(bytes);
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<f64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

/// Extract `VmRSS` (reported in kB) from `/proc/self/status` as bytes
fn parse_vm_rss(status: &str) -> Option<f64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kb = line.split_whitespace().nth(1)?.parse::<f64>().ok()?;
    Some(kb * 1024.0)
}

/// Serve `/metrics` on the given port until the process exits
pub async fn start_metrics_server(port: u16) -> Result<()> {
    let handle = init_metrics()?;

    tokio::spawn(process_metrics_task());

    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}
