use anyhow::{Context, Result};
use reading_relay::WeatherReading;
use reading_relay::config::BrokerArgs;
use reading_relay::consumer::ensure_stream;
use reading_relay::publisher::{ReadingPublisher, load_payloads};
use std::path::PathBuf;
use tracing::{info, warn};

pub async fn handle_publish(broker: BrokerArgs, file: PathBuf) -> Result<()> {
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "publish");
    });

    let payloads = load_payloads(&file).await?;

    let subject = broker.subject();
    info!("Connecting to NATS at {}...", broker.nats_url);
    let nats_client = async_nats::ConnectOptions::new()
        .name("reading-relay-publisher")
        .connect(&broker.nats_url)
        .await
        .context("Failed to connect to NATS")?;

    let jetstream = async_nats::jetstream::new(nats_client);
    // Without a stream bound to the subject the broker would reject every publish
    ensure_stream(&jetstream, &broker.queue_name, &subject).await?;
    let publisher = ReadingPublisher::new(jetstream, subject.clone());

    let mut published = 0usize;
    for (index, line) in payloads.iter().enumerate() {
        // Malformed lines are published anyway so the relay's discard path can be exercised
        if let Err(e) = WeatherReading::decode(line.as_bytes()) {
            warn!("Reading {} will be discarded by the relay: {}", index + 1, e);
        }

        publisher
            .publish(line.clone())
            .await
            .with_context(|| format!("Failed to publish reading {}", index + 1))?;
        published += 1;
    }

    info!(
        "Published {} reading(s) from {} to '{}'",
        published,
        file.display(),
        subject
    );
    Ok(())
}
