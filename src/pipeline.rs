//! Per-message processing: decode, validate, deliver with bounded retry, settle
//!
//! Every delivery handed to [`DeliveryPipeline::process`] ends in exactly one
//! terminal outcome and exactly one ack/nack against the queue:
//!
//! | Outcome    | Cause                                   | Queue action        |
//! |------------|-----------------------------------------|---------------------|
//! | `Rejected` | payload did not decode or failed checks | nack, no requeue    |
//! | `Acked`    | sink accepted the reading               | ack                 |
//! | `Requeued` | every sink attempt failed               | nack, requeue       |
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::delivery::Delivery;
use crate::error::{DecodeError, DeliveryError, ValidationError};
use crate::reading::WeatherReading;
use crate::retry::RetryPolicy;
use crate::sink::ReadingSink;
use crate::validation;

/// Why a message was discarded without requeue
#[derive(Debug)]
pub enum RejectReason {
    Decode(DecodeError),
    Validation(ValidationError),
}

impl RejectReason {
    fn label(&self) -> &'static str {
        match self {
            RejectReason::Decode(_) => "decode",
            RejectReason::Validation(_) => "validation",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Decode(e) => write!(f, "{}", e),
            RejectReason::Validation(e) => write!(f, "invalid reading: {}", e),
        }
    }
}

/// Terminal state of one delivery
#[derive(Debug)]
pub enum Outcome {
    /// Discarded permanently; the sink was never called
    Rejected(RejectReason),
    /// Delivered to the sink on attempt `attempts`
    Acked { attempts: u32, status: u16 },
    /// All attempts failed; returned to the queue
    Requeued {
        attempts: u32,
        last_error: DeliveryError,
    },
}

impl Outcome {
    /// Number of times the sink was called
    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Rejected(_) => 0,
            Outcome::Acked { attempts, .. } | Outcome::Requeued { attempts, .. } => *attempts,
        }
    }
}

/// Drives one delivery at a time through the relay
pub struct DeliveryPipeline<S> {
    sink: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for DeliveryPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            policy: self.policy,
        }
    }
}

impl<S: ReadingSink> DeliveryPipeline<S> {
    pub fn new(sink: S, policy: RetryPolicy) -> Self {
        Self::with_shared_sink(Arc::new(sink), policy)
    }

    pub fn with_shared_sink(sink: Arc<S>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Process one delivery to its terminal outcome and settle it with the queue
    ///
    /// Failing to settle is logged and counted but does not change the outcome:
    /// an unsettled message is redelivered by the broker.
    pub async fn process<D: Delivery + ?Sized>(&self, delivery: &D) -> Outcome {
        let start = Instant::now();
        metrics::counter!("relay.messages.received_total").increment(1);

        let outcome = self.resolve(delivery.payload()).await;

        let settled = match &outcome {
            Outcome::Rejected(reason) => {
                warn!("Discarding message without requeue: {}", reason);
                metrics::counter!("relay.messages.rejected_total", "reason" => reason.label())
                    .increment(1);
                delivery.nack(false).await
            }
            Outcome::Acked { attempts, status } => {
                info!(
                    "Delivered reading to sink (status {}, attempt {}/{})",
                    status, attempts, self.policy.max_attempts
                );
                metrics::counter!("relay.messages.acked_total").increment(1);
                delivery.ack().await
            }
            Outcome::Requeued {
                attempts,
                last_error,
            } => {
                error!(
                    "Sink delivery failed after {} attempts, requeueing message: {}",
                    attempts, last_error
                );
                metrics::counter!("relay.messages.requeued_total").increment(1);
                delivery.nack(true).await
            }
        };

        if let Err(e) = settled {
            error!("{} - message will be redelivered by the broker", e);
            metrics::counter!("relay.settle.errors_total").increment(1);
        }

        metrics::histogram!("relay.message_processing_latency_ms")
            .record(start.elapsed().as_millis() as f64);

        outcome
    }

    /// Decide the outcome for a payload without touching the queue
    pub async fn resolve(&self, payload: &[u8]) -> Outcome {
        let reading = match WeatherReading::decode(payload) {
            Ok(reading) => reading,
            Err(e) => return Outcome::Rejected(RejectReason::Decode(e)),
        };

        if let Err(e) = validation::validate(&reading) {
            return Outcome::Rejected(RejectReason::Validation(e));
        }

        self.deliver(&reading).await
    }

    async fn deliver(&self, reading: &WeatherReading) -> Outcome {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            metrics::counter!("relay.sink.attempts_total").increment(1);

            match self.sink.send(reading).await {
                Ok(receipt) => {
                    return Outcome::Acked {
                        attempts: attempt,
                        status: receipt.status,
                    };
                }
                Err(e) => {
                    metrics::counter!("relay.sink.failures_total").increment(1);
                    warn!(
                        "Failed to deliver reading {} (attempt {}/{}): {}",
                        reading.timestamp, attempt, max_attempts, e
                    );

                    match self.policy.delay_after(attempt) {
                        Some(delay) => {
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        None => {
                            return Outcome::Requeued {
                                attempts: attempt,
                                last_error: e,
                            };
                        }
                    }
                }
            }
        }
    }
}
