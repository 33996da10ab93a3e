//! reading-relay - relays weather readings from a durable NATS JetStream queue
//! to an HTTP ingestion endpoint
//!
//! Each message is decoded, checked for plausibility and POSTed to the sink
//! with bounded retry, then acknowledged, discarded or requeued depending on
//! the outcome.

pub mod config;
pub mod consumer;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod reading;
pub mod retry;
pub mod sink;
pub mod validation;

pub use consumer::{JetStreamConsumer, consume};
pub use delivery::Delivery;
pub use error::{DecodeError, DeliveryError, ValidationError};
pub use pipeline::{DeliveryPipeline, Outcome, RejectReason};
pub use reading::WeatherReading;
pub use retry::RetryPolicy;
pub use sink::{HttpSink, ReadingSink, SinkReceipt};

/// Build version from `git describe`, or the package version outside a checkout
pub fn version() -> &'static str {
    match option_env!("VERGEN_GIT_DESCRIBE") {
        Some(describe) if describe != "VERGEN_IDEMPOTENT_OUTPUT" => describe,
        _ => env!("CARGO_PKG_VERSION"),
    }
}
