use anyhow::{Context, Result};
use async_nats::jetstream::{
    consumer::{AckPolicy, DeliverPolicy, PullConsumer, pull::Config as PullConfig},
    context::Context as JetStreamContext,
    stream::{Config as StreamConfig, RetentionPolicy, Stream as JetStream, StorageType},
};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::delivery::Delivery;
use crate::pipeline::DeliveryPipeline;
use crate::retry::RetryPolicy;
use crate::sink::ReadingSink;

/// Pause after a receive error so a broken subscription does not spin
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Messages requested per pull; a worker holds at most one unsettled message
pub const PULL_BATCH_SIZE: usize = 1;

/// Slack added on top of the worst-case processing time when sizing `ack_wait`
const ACK_WAIT_MARGIN: Duration = Duration::from_secs(30);

/// Durable JetStream queue that readings are consumed from
///
/// The stream is declared with work-queue retention so each message is handed
/// to a single consumer and removed once acknowledged. The durable consumer
/// uses explicit acks, so nothing is considered processed until the pipeline
/// settles it.
#[derive(Clone)]
pub struct JetStreamConsumer {
    consumer: PullConsumer,
    stream_name: String,
    consumer_name: String,
}

impl JetStreamConsumer {
    /// Declare the stream and durable consumer, reusing them if they exist
    ///
    /// `ack_wait` must cover the worst-case time to process one message,
    /// otherwise the broker redelivers messages that are still being retried.
    pub async fn new(
        jetstream: JetStreamContext,
        stream_name: String,
        subject: String,
        consumer_name: String,
        ack_wait: Duration,
        workers: usize,
    ) -> Result<Self> {
        info!(
            "Setting up JetStream consumer '{}' for stream '{}' (subject '{}')...",
            consumer_name, stream_name, subject
        );

        let stream = ensure_stream(&jetstream, &stream_name, &subject).await?;

        let consumer_config = pull_config(&consumer_name, subject, ack_wait, workers);

        let consumer = stream
            .get_or_create_consumer(&consumer_name, consumer_config)
            .await
            .with_context(|| format!("Failed to create JetStream consumer '{}'", consumer_name))?;

        info!(
            "JetStream consumer '{}' ready (ack_wait {:?})",
            consumer_name, ack_wait
        );

        Ok(Self {
            consumer,
            stream_name,
            consumer_name,
        })
    }

    /// Run one worker against the durable consumer
    ///
    /// Each worker opens its own message stream pulling one message per
    /// request, so several workers share the queue while each settles one
    /// message before the next is delivered to it.
    pub async fn run_worker<S: ReadingSink>(
        &self,
        worker_id: usize,
        pipeline: DeliveryPipeline<S>,
    ) -> Result<()> {
        info!(
            "Worker {} starting on consumer '{}' for stream '{}'",
            worker_id, self.consumer_name, self.stream_name
        );

        let messages = self
            .consumer
            .stream()
            .max_messages_per_batch(PULL_BATCH_SIZE)
            .messages()
            .await
            .context("Failed to open JetStream message stream")?;

        metrics::gauge!("relay.jetstream.connected").set(1.0);
        let processed = consume(messages, &pipeline).await;
        metrics::gauge!("relay.jetstream.connected").set(0.0);

        anyhow::bail!(
            "JetStream message stream for worker {} ended after {} messages",
            worker_id,
            processed
        )
    }
}

/// Durable pull consumer settings for `workers` single-message workers
///
/// `max_ack_pending` caps unsettled messages at one per worker, so the
/// `ack_wait` clock never runs on a message no worker has picked up.
pub fn pull_config(
    consumer_name: &str,
    subject: String,
    ack_wait: Duration,
    workers: usize,
) -> PullConfig {
    PullConfig {
        durable_name: Some(consumer_name.to_string()),
        ack_policy: AckPolicy::Explicit,
        ack_wait,
        max_ack_pending: i64::try_from(workers).unwrap_or(i64::MAX),
        deliver_policy: DeliverPolicy::All,
        filter_subject: subject,
        ..Default::default()
    }
}

/// Declare the work-queue stream for `subject`, reusing it if it exists
pub async fn ensure_stream(
    jetstream: &JetStreamContext,
    stream_name: &str,
    subject: &str,
) -> Result<JetStream> {
    let stream = jetstream
        .get_or_create_stream(StreamConfig {
            name: stream_name.to_string(),
            subjects: vec![subject.to_string()],
            retention: RetentionPolicy::WorkQueue,
            storage: StorageType::File,
            num_replicas: 1,
            ..Default::default()
        })
        .await
        .with_context(|| format!("Failed to get or create JetStream stream '{}'", stream_name))?;

    info!("JetStream stream '{}' ready", stream_name);
    Ok(stream)
}

/// Feed deliveries to the pipeline one at a time until the stream ends
///
/// Each delivery reaches a terminal outcome before the next one is pulled.
/// Receive errors are logged and skipped. Returns the number of deliveries
/// processed.
pub async fn consume<St, D, E, S>(mut deliveries: St, pipeline: &DeliveryPipeline<S>) -> u64
where
    St: Stream<Item = Result<D, E>> + Unpin,
    D: Delivery,
    E: Display,
    S: ReadingSink,
{
    let mut processed_count = 0u64;
    let start_time = Instant::now();
    let mut last_log_time = Instant::now();
    let mut last_log_count = 0u64;

    while let Some(delivery) = deliveries.next().await {
        match delivery {
            Ok(delivery) => {
                pipeline.process(&delivery).await;
                processed_count += 1;

                if processed_count.is_multiple_of(1000) {
                    let rate_since_start = processed_count as f64 / start_time.elapsed().as_secs_f64();
                    let rate_recent = (processed_count - last_log_count) as f64
                        / last_log_time.elapsed().as_secs_f64();
                    info!(
                        "Processed {} messages ({:.1} msg/s since start, {:.1} msg/s recent)",
                        processed_count, rate_since_start, rate_recent
                    );
                    last_log_time = Instant::now();
                    last_log_count = processed_count;
                }
            }
            Err(e) => {
                error!("Error receiving message from JetStream: {}", e);
                metrics::counter!("relay.jetstream.receive_error_total").increment(1);
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
            }
        }
    }

    warn!(
        "Delivery stream ended after {} messages",
        processed_count
    );
    processed_count
}

/// Worst-case time to settle one message under `policy` plus a safety margin
pub fn ack_wait_for(policy: &RetryPolicy, request_timeout: Duration) -> Duration {
    request_timeout
        .saturating_mul(policy.max_attempts)
        .saturating_add(policy.total_backoff())
        .saturating_add(ACK_WAIT_MARGIN)
}
