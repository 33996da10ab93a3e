//! Relay configuration from command-line flags and the process environment
//!
//! Every flag falls back to an environment variable and then to a default, so
//! the relay runs unconfigured against a local broker and API. A `.env` file
//! is loaded by `main` before parsing.
use anyhow::{Result, bail};
use clap::Args;
use reqwest::Url;
use std::time::Duration;

use crate::retry::RetryPolicy;

pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";
pub const DEFAULT_API_URL: &str = "http://localhost:3000/api/weather/logs";
pub const DEFAULT_QUEUE_NAME: &str = "weather_data";
pub const DEFAULT_CONSUMER_NAME: &str = "reading-relay";

/// Upper bounds keeping the worst-case time per message, and so `ack_wait`, sane
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;
pub const MAX_BACKOFF_UNIT: Duration = Duration::from_secs(600);
pub const MAX_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Broker connection and queue naming, shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct BrokerArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// Durable queue (JetStream stream) name
    #[arg(long, env = "QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,

    /// Subject bound to the queue (defaults to the queue name)
    #[arg(long, env = "QUEUE_SUBJECT")]
    pub subject: Option<String>,
}

impl BrokerArgs {
    pub fn subject(&self) -> String {
        self.subject
            .clone()
            .unwrap_or_else(|| self.queue_name.clone())
    }
}

/// Flags for the `run` subcommand
#[derive(Args, Debug, Clone)]
pub struct RelayArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Ingestion endpoint readings are POSTed to
    #[arg(long, env = "API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Durable consumer name; instances sharing it split the queue between them
    #[arg(long, env = "CONSUMER_NAME", default_value = DEFAULT_CONSUMER_NAME)]
    pub consumer_name: String,

    /// Sink attempts per message before it is requeued
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = crate::retry::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; attempt i is followed by i units of delay
    #[arg(long, env = "BACKOFF_UNIT_MS", default_value_t = 1000)]
    pub backoff_ms: u64,

    /// Timeout for a single sink request
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Number of worker tasks, each settling one message at a time
    #[arg(long, env = "WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Port for the Prometheus metrics endpoint (disabled when unset)
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Validated settings for the relay service
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub nats_url: String,
    pub api_url: String,
    pub stream_name: String,
    pub subject: String,
    pub consumer_name: String,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub workers: usize,
    pub metrics_port: Option<u16>,
}

impl TryFrom<RelayArgs> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(args: RelayArgs) -> Result<Self> {
        let config = RelayConfig {
            subject: args.broker.subject(),
            nats_url: args.broker.nats_url,
            stream_name: args.broker.queue_name,
            api_url: args.api_url,
            consumer_name: args.consumer_name,
            retry: RetryPolicy::new(args.max_attempts, Duration::from_millis(args.backoff_ms)),
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            workers: args.workers,
            metrics_port: args.metrics_port,
        };
        config.validate()?;
        Ok(config)
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("max attempts must be at least 1");
        }
        if self.retry.max_attempts > MAX_ATTEMPTS_LIMIT {
            bail!(
                "max attempts must be at most {}, got {}",
                MAX_ATTEMPTS_LIMIT,
                self.retry.max_attempts
            );
        }
        if self.retry.backoff_unit > MAX_BACKOFF_UNIT {
            bail!(
                "backoff unit must be at most {:?}, got {:?}",
                MAX_BACKOFF_UNIT,
                self.retry.backoff_unit
            );
        }
        if self.request_timeout > MAX_REQUEST_TIMEOUT {
            bail!(
                "request timeout must be at most {:?}, got {:?}",
                MAX_REQUEST_TIMEOUT,
                self.request_timeout
            );
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("request timeout must be greater than zero");
        }
        if self.stream_name.is_empty() || self.consumer_name.is_empty() {
            bail!("queue name and consumer name must not be empty");
        }

        let url = Url::parse(&self.api_url)
            .map_err(|e| anyhow::anyhow!("invalid API URL '{}': {}", self.api_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "API URL '{}' must use http or https, not '{}'",
                self.api_url,
                url.scheme()
            );
        }

        Ok(())
    }
}
