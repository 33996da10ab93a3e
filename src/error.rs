//! Error taxonomy for the delivery pipeline
//!
//! Decode and validation errors are permanent: the message is discarded.
//! Delivery errors are transient: the send is retried and the message is
//! requeued once the attempt budget is spent.
use thiserror::Error;

/// The payload could not be decoded into a reading
#[derive(Debug, Error)]
#[error("malformed reading payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// A decoded reading failed a plausibility check
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("timestamp is empty")]
    EmptyTimestamp,
    #[error("temperature {0} outside [-100, 100]")]
    TemperatureOutOfRange(f64),
    #[error("humidity {0} outside [0, 100]")]
    HumidityOutOfRange(f64),
    #[error("wind speed {0} is negative")]
    NegativeWindSpeed(f64),
}

/// The sink did not accept the reading
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("sink returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to send request: {0}")]
    Transport(String),
    #[error("failed to encode reading: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DeliveryError {
    /// HTTP status carried by the error, if the sink answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
