//! Broker ports.
//!
//! A broker adapter (RabbitMQ, Kafka, ...) implements [`Publisher`] for the
//! outbox side and [`Consumer`] for the inbox side.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{Message, Publishing};
use crate::error::Result;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Send one publishing. Errors are opaque; callers retry per policy.
    async fn send(&self, publishing: &Publishing) -> Result<()>;
}

/// One inbound delivery. The consumer must either `ack` or `nack` it.
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> &Message;

    async fn ack(self: Box<Self>) -> Result<()>;

    /// Reject; the broker is expected to redeliver.
    async fn nack(self: Box<Self>) -> Result<()>;
}

pub type Deliveries = mpsc::UnboundedReceiver<Box<dyn Delivery>>;

#[async_trait]
pub trait Consumer: Send + Sync {
    async fn listen(&self) -> Result<Deliveries>;
}
