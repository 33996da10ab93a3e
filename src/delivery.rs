//! Queue deliveries and their terminal actions
//!
//! A delivery is one message handed out by the broker together with the
//! capability to settle it. The pipeline settles every delivery exactly once.
use anyhow::Result;
use async_nats::jetstream::{AckKind, Message};
use async_trait::async_trait;
use std::sync::Arc;

/// One message received from the queue, paired with its ack/nack handle
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Opaque message body
    fn payload(&self) -> &[u8];

    /// Mark the message fully processed; it will not be redelivered
    async fn ack(&self) -> Result<()>;

    /// Reject the message, either discarding it or returning it to the queue
    async fn nack(&self, requeue: bool) -> Result<()>;
}

#[async_trait]
impl<T: Delivery + ?Sized> Delivery for Arc<T> {
    fn payload(&self) -> &[u8] {
        (**self).payload()
    }

    async fn ack(&self) -> Result<()> {
        (**self).ack().await
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        (**self).nack(requeue).await
    }
}

#[async_trait]
impl Delivery for Message {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<()> {
        self.ack_with(AckKind::Ack)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ACK message: {}", e))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        // Term stops redelivery for good; Nak asks for immediate redelivery
        let kind = if requeue {
            AckKind::Nak(None)
        } else {
            AckKind::Term
        };
        self.ack_with(kind)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to NAK message (requeue={}): {}", requeue, e))
    }
}
