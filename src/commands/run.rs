use anyhow::{Context, Result};
use reading_relay::config::{RelayArgs, RelayConfig};
use reading_relay::consumer::{JetStreamConsumer, ack_wait_for};
use reading_relay::{DeliveryPipeline, HttpSink};
use tokio::task::JoinSet;
use tracing::Instrument;
use tracing::{error, info};

pub async fn handle_run(args: RelayArgs) -> Result<()> {
    let config = RelayConfig::try_from(args).context("Invalid relay configuration")?;

    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "run");
    });

    info!("Starting reading-relay {}", reading_relay::version());
    info!("  NATS URL: {}", config.nats_url);
    info!("  API URL: {}", config.api_url);
    info!(
        "  Queue: stream '{}', subject '{}', consumer '{}'",
        config.stream_name, config.subject, config.consumer_name
    );
    info!(
        "  Retry: {} attempts, {:?} backoff unit, {:?} request timeout",
        config.retry.max_attempts, config.retry.backoff_unit, config.request_timeout
    );
    info!("  Workers: {}", config.workers);

    // Metrics must be initialized to zero before the exporter can be scraped
    reading_relay::metrics::initialize_relay_metrics();
    if let Some(metrics_port) = config.metrics_port {
        let metrics_handle = tokio::spawn(
            async move { reading_relay::metrics::start_metrics_server(metrics_port).await }
                .instrument(tracing::info_span!("metrics_server")),
        );
        // Monitor the metrics server so we know if it dies
        tokio::spawn(async move {
            match metrics_handle.await {
                Ok(Ok(())) => error!("Metrics server exited unexpectedly"),
                Ok(Err(e)) => error!("Metrics server failed: {:#}", e),
                Err(e) => error!("Metrics server task panicked: {}", e),
            }
        });
    }

    info!("Connecting to NATS at {}...", config.nats_url);
    let nats_client = async_nats::ConnectOptions::new()
        .name("reading-relay")
        .connect(&config.nats_url)
        .await
        .context("Failed to connect to NATS")?;
    info!("Connected to NATS successfully");

    let jetstream = async_nats::jetstream::new(nats_client);
    let consumer = JetStreamConsumer::new(
        jetstream,
        config.stream_name.clone(),
        config.subject.clone(),
        config.consumer_name.clone(),
        ack_wait_for(&config.retry, config.request_timeout),
        config.workers,
    )
    .await?;

    let sink = HttpSink::new(config.api_url.clone(), config.request_timeout)?;
    let pipeline = DeliveryPipeline::new(sink, config.retry);

    let mut workers = JoinSet::new();
    for worker_id in 0..config.workers {
        let consumer = consumer.clone();
        let pipeline = pipeline.clone();
        workers.spawn(
            async move { consumer.run_worker(worker_id, pipeline).await }
                .instrument(tracing::info_span!("worker", id = worker_id)),
        );
    }
    info!(
        "Spawned {} worker(s); waiting for messages. Press Ctrl+C to stop.",
        config.workers
    );

    tokio::select! {
        signal = shutdown_signal() => {
            signal?;
            // In-flight messages were never settled, so the broker redelivers them
            workers.abort_all();
            info!("Relay stopped");
            Ok(())
        }
        Some(joined) = workers.join_next() => {
            workers.abort_all();
            match joined {
                Ok(result) => result.context("Relay worker stopped"),
                Err(e) => Err(anyhow::anyhow!("Relay worker panicked: {}", e)),
            }
        }
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C)
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for SIGINT signal")?;
        info!("Received SIGINT (Ctrl+C), shutting down...");
    }

    Ok(())
}
