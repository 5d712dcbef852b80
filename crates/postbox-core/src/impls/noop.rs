use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::Publishing;
use crate::error::Result;
use crate::ports::{Consumer, Deliveries, Publisher};

/// Broker that accepts every publishing and never delivers anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroker;

#[async_trait]
impl Publisher for NoopBroker {
    async fn send(&self, _publishing: &Publishing) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Consumer for NoopBroker {
    /// The returned stream is already closed.
    async fn listen(&self) -> Result<Deliveries> {
        let (_, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }
}
