use anyhow::{Context, Result};
use async_nats::jetstream::context::Context as JetStreamContext;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// Publishes reading payloads onto the relay's queue
///
/// Used to replay recorded readings into a local or staging broker. Each
/// publish waits for the JetStream ack, so a returned `Ok` means the message
/// is stored.
#[derive(Clone)]
pub struct ReadingPublisher {
    jetstream: JetStreamContext,
    subject: String,
}

impl ReadingPublisher {
    pub fn new(jetstream: JetStreamContext, subject: String) -> Self {
        Self { jetstream, subject }
    }

    /// Publish one payload as-is; no decoding or validation is applied
    pub async fn publish(&self, payload: impl Into<Bytes>) -> Result<u64> {
        let ack = self
            .jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .context("Failed to publish message to JetStream")?
            .await
            .context("Failed to get ack from JetStream")?;

        debug!(
            "Published reading to '{}' (stream {}, seq {})",
            self.subject, ack.stream, ack.sequence
        );
        metrics::counter!("relay.publisher.published_total").increment(1);

        Ok(ack.sequence)
    }
}

/// Payload lines of a JSON-lines file, skipping blanks and `#` comments
pub fn payload_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// Read a JSON-lines readings file into its payloads
pub async fn load_payloads(path: &Path) -> Result<Vec<String>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read readings file {}", path.display()))?;
    Ok(payload_lines(&contents).map(str::to_owned).collect())
}
