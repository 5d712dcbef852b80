//! Receiver - persists deliveries before acknowledging them.
//!
//! Settlement rules:
//! - saved: ack;
//! - already stored (`Exists`): ack, the message is a redelivery;
//! - any other store error: nack, so the broker delivers it again.

use std::sync::Arc;

use crate::app::{ShutdownSignal, TaskGroup};
use crate::error::Code;
use crate::observability::Logger;
use crate::ports::{Deliveries, Delivery, InboxRepository};

/// How a delivery was settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Nacked,
}

#[derive(Clone)]
pub struct Receiver {
    repo: Arc<dyn InboxRepository>,
    logger: Logger,
}

impl Receiver {
    pub fn new(repo: Arc<dyn InboxRepository>, logger: Logger) -> Self {
        Self { repo, logger }
    }

    /// Store one delivery and settle it.
    pub async fn handle_delivery(&self, delivery: Box<dyn Delivery>) -> Settlement {
        self.logger.scope(self.settle(delivery)).await
    }

    /// Consume `deliveries` on `tasks` until shutdown or until the broker
    /// closes the stream.
    pub fn receive(&self, deliveries: Deliveries, tasks: &mut TaskGroup) {
        let signal = tasks.shutdown_signal();
        tasks.spawn(
            self.logger
                .in_span(self.clone().run(deliveries, signal), || tracing::info_span!("inbox.receiver")),
        );
    }

    async fn run(self, mut deliveries: Deliveries, mut shutdown: ShutdownSignal) {
        loop {
            let delivery = tokio::select! {
                _ = shutdown.recv() => break,
                next = deliveries.recv() => match next {
                    Some(d) => d,
                    None => {
                        tracing::info!("delivery stream closed");
                        break;
                    }
                },
            };
            self.settle(delivery).await;
        }
        tracing::debug!("receiver stopped");
    }

    async fn settle(&self, delivery: Box<dyn Delivery>) -> Settlement {
        let id = delivery.message().id.clone();
        let settlement = match self.repo.save_message(delivery.message()).await {
            Ok(()) => {
                tracing::debug!(id = %id, "message stored");
                Settlement::Acked
            }
            Err(e) if e.is(Code::Exists) => {
                tracing::debug!(id = %id, "duplicate message");
                Settlement::Acked
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "could not store message");
                Settlement::Nacked
            }
        };

        let settled = match settlement {
            Settlement::Acked => delivery.ack().await,
            Settlement::Nacked => delivery.nack().await,
        };
        if let Err(e) = settled {
            tracing::warn!(id = %id, ?settlement, error = %e, "could not settle delivery");
        }
        settlement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceId, Message, MessageType, Publishing};
    use crate::error::{Error, Result};
    use crate::impls::{InMemoryBroker, InMemoryInboxRepository};
    use crate::ports::{Consumer, LeaseStore, Publisher};
    use crate::test_support::eventually;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::time::Duration;

    fn message(id: &str) -> Message {
        Message::new(id, "user.created", b"{}".to_vec())
    }

    #[tokio::test]
    async fn redelivery_is_acked_and_stored_once() {
        let repo = Arc::new(InMemoryInboxRepository::new());
        let broker = InMemoryBroker::new();
        let receiver = Receiver::new(repo.clone(), Logger::disabled());
        let mut deliveries = broker.listen().await.unwrap();

        broker.deliver(message("m1")).await;
        broker.deliver(message("m1")).await;

        for _ in 0..2 {
            let d = deliveries.recv().await.unwrap();
            assert_eq!(receiver.handle_delivery(d).await, Settlement::Acked);
        }
        assert_eq!(broker.acked().await, vec!["m1".to_string(), "m1".to_string()]);
        assert_eq!(repo.counts().await.total(), 1);
    }

    struct DownRepo;

    #[async_trait]
    impl LeaseStore for DownRepo {
        async fn set_as_processed(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn mark_for_retry(&self, _id: &str, _at: DateTime<Utc>) -> Result<()> {
            Ok(())
        }
        async fn clear_locks(&self, _i: &InstanceId, _before: DateTime<Utc>) -> Result<usize> {
            Ok(0)
        }
    }

    #[async_trait]
    impl InboxRepository for DownRepo {
        async fn save_message(&self, _message: &Message) -> Result<()> {
            Err(Error::message("database is down"))
        }
        async fn lease_unprocessed(&self, _i: &InstanceId, _max: u32, _t: &[MessageType]) -> Result<Message> {
            Err(Error::not_found("nothing"))
        }
    }

    #[tokio::test]
    async fn store_failure_is_nacked() {
        let broker = InMemoryBroker::new().without_requeue();
        let receiver = Receiver::new(Arc::new(DownRepo), Logger::disabled());
        let mut deliveries = broker.listen().await.unwrap();

        broker.deliver(message("m1")).await;
        let d = deliveries.recv().await.unwrap();

        assert_eq!(receiver.handle_delivery(d).await, Settlement::Nacked);
        assert_eq!(broker.nacked().await, vec!["m1".to_string()]);
        assert!(broker.acked().await.is_empty());
    }

    #[tokio::test]
    async fn receive_loop_stores_published_messages() {
        let repo = Arc::new(InMemoryInboxRepository::new());
        let broker = InMemoryBroker::new();
        let receiver = Receiver::new(repo.clone(), Logger::disabled());
        let mut tasks = TaskGroup::new();
        receiver.receive(broker.listen().await.unwrap(), &mut tasks);

        broker
            .send(&Publishing::new("users", message("m1")))
            .await
            .unwrap();
        broker.deliver(message("m1")).await;
        broker.deliver(message("m2")).await;

        assert!(eventually(|| async { broker.acked().await.len() == 3 }).await);
        assert_eq!(repo.counts().await.total(), 2);
        assert!(repo.record("m2").await.is_some());

        tokio::time::timeout(Duration::from_secs(1), tasks.shutdown_and_join())
            .await
            .unwrap();
    }
}
