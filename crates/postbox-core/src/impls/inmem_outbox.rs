use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::lease_table::LeaseTable;
use crate::domain::{InstanceId, LeaseRecord, Publishing, RowState};
use crate::error::{Error, Result};
use crate::observability::RowCounts;
use crate::ports::{Clock, LeaseStore, OutboxRepository, SystemClock};

/// Outbox table kept in memory.
///
/// `add` plays the part of the application's insert, which in a real store
/// happens in the same transaction as the business change.
pub struct InMemoryOutboxRepository {
    table: LeaseTable<Publishing>,
}

impl InMemoryOutboxRepository {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            table: LeaseTable::new(clock),
        }
    }

    pub async fn add(&self, publishing: Publishing) -> Result<()> {
        self.table
            .insert(publishing)
            .await
            .map_err(|e| Error::op("impls.InMemoryOutboxRepository.add").wrap(e))
    }

    pub async fn record(&self, id: &str) -> Option<LeaseRecord<Publishing>> {
        self.table.record(id).await
    }

    pub async fn is_processed(&self, id: &str) -> bool {
        self.state(id).await == Some(RowState::Processed)
    }

    pub async fn is_leased(&self, id: &str) -> bool {
        self.state(id).await == Some(RowState::Leased)
    }

    pub async fn counts(&self) -> RowCounts {
        self.table.counts().await
    }

    async fn state(&self, id: &str) -> Option<RowState> {
        self.table.record(id).await.map(|r| r.state())
    }
}

impl Default for InMemoryOutboxRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryOutboxRepository {
    async fn set_as_processed(&self, id: &str) -> Result<()> {
        self.table
            .set_as_processed(id)
            .await
            .map_err(|e| Error::op("impls.InMemoryOutboxRepository.set_as_processed").wrap(e))
    }

    async fn mark_for_retry(&self, id: &str, retry_at: DateTime<Utc>) -> Result<()> {
        self.table
            .mark_for_retry(id, retry_at)
            .await
            .map_err(|e| Error::op("impls.InMemoryOutboxRepository.mark_for_retry").wrap(e))
    }

    async fn clear_locks(&self, instance_id: &InstanceId, leased_before: DateTime<Utc>) -> Result<usize> {
        Ok(self.table.clear_locks(instance_id, leased_before).await)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutboxRepository {
    async fn lease_unsent(&self, instance_id: &InstanceId, max_retries: u32) -> Result<Publishing> {
        self.table
            .acquire(instance_id, max_retries, |_| true)
            .await
            .map_err(|e| Error::op("impls.InMemoryOutboxRepository.lease_unsent").wrap(e))
    }
}
