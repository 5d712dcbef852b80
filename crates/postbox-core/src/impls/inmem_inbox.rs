use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::lease_table::LeaseTable;
use crate::domain::{InstanceId, LeaseRecord, Message, MessageType, RowState};
use crate::error::{Error, Result};
use crate::observability::RowCounts;
use crate::ports::{Clock, InboxRepository, LeaseStore, SystemClock};

/// Inbox table kept in memory. The message id is the deduplication key.
pub struct InMemoryInboxRepository {
    table: LeaseTable<Message>,
}

impl InMemoryInboxRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: LeaseTable::new(clock),
        }
    }

    pub async fn record(&self, id: &str) -> Option<LeaseRecord<Message>> {
        self.table.record(id).await
    }

    pub async fn is_processed(&self, id: &str) -> bool {
        self.table.record(id).await.map(|r| r.state()) == Some(RowState::Processed)
    }

    pub async fn counts(&self) -> RowCounts {
        self.table.counts().await
    }
}

impl Default for InMemoryInboxRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryInboxRepository {
    async fn set_as_processed(&self, id: &str) -> Result<()> {
        self.table
            .set_as_processed(id)
            .await
            .map_err(|e| Error::op("impls.InMemoryInboxRepository.set_as_processed").wrap(e))
    }

    async fn mark_for_retry(&self, id: &str, retry_at: DateTime<Utc>) -> Result<()> {
        self.table
            .mark_for_retry(id, retry_at)
            .await
            .map_err(|e| Error::op("impls.InMemoryInboxRepository.mark_for_retry").wrap(e))
    }

    async fn clear_locks(&self, instance_id: &InstanceId, leased_before: DateTime<Utc>) -> Result<usize> {
        Ok(self.table.clear_locks(instance_id, leased_before).await)
    }
}

#[async_trait]
impl InboxRepository for InMemoryInboxRepository {
    async fn save_message(&self, message: &Message) -> Result<()> {
        self.table
            .insert(message.clone())
            .await
            .map_err(|e| Error::op("impls.InMemoryInboxRepository.save_message").wrap(e))
    }

    async fn lease_unprocessed(
        &self,
        instance_id: &InstanceId,
        max_retries: u32,
        allowed_types: &[MessageType],
    ) -> Result<Message> {
        self.table
            .acquire(instance_id, max_retries, |m| allowed_types.contains(&m.message_type))
            .await
            .map_err(|e| Error::op("impls.InMemoryInboxRepository.lease_unprocessed").wrap(e))
    }
}
