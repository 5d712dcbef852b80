//! Repository ports - the durable store is the source of truth and the only
//! lock manager.
//!
//! # Atomic lease acquisition
//! `lease_unsent` / `lease_unprocessed` must select an eligible row and write
//! the lease in one store operation. On PostgreSQL that is a conditional
//! update such as
//!
//! ```sql
//! UPDATE outbox SET locked_by = $1, locked_at = now(), attempts = attempts + 1
//! WHERE id = (
//!     SELECT id FROM outbox
//!     WHERE locked_by IS NULL AND processed_at IS NULL
//!       AND attempts < $2 AND next_retry_at <= now()
//!     LIMIT 1 FOR UPDATE SKIP LOCKED
//! )
//! RETURNING id, topic, type, payload;
//! ```
//!
//! Doing it as a read followed by a separate write lets two instances lease
//! the same row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{InstanceId, Message, MessageType, Publishing};
use crate::error::Result;

/// Lease operations shared by the outbox and inbox tables.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Clear the lease and mark the row terminal-success.
    /// Unknown id ⇒ `Code::NotFound`.
    async fn set_as_processed(&self, id: &str) -> Result<()>;

    /// Clear the lease and hold the row back until `retry_at`.
    /// Unknown id ⇒ `Code::NotFound`.
    async fn mark_for_retry(&self, id: &str, retry_at: DateTime<Utc>) -> Result<()>;

    /// Release every lease owned by `instance_id` taken before `leased_before`.
    /// Returns how many leases were released.
    async fn clear_locks(&self, instance_id: &InstanceId, leased_before: DateTime<Utc>)
    -> Result<usize>;
}

#[async_trait]
pub trait OutboxRepository: LeaseStore {
    /// Atomically lease one unleased, retry-eligible publishing with
    /// `attempts < max_retries` to `instance_id`.
    /// Nothing eligible ⇒ `Code::NotFound`.
    async fn lease_unsent(&self, instance_id: &InstanceId, max_retries: u32) -> Result<Publishing>;
}

#[async_trait]
pub trait InboxRepository: LeaseStore {
    /// Durably record an inbound message.
    /// Already recorded ⇒ `Code::Exists`.
    async fn save_message(&self, message: &Message) -> Result<()>;

    /// Atomically lease one unprocessed message whose type is in
    /// `allowed_types`. Nothing eligible ⇒ `Code::NotFound`.
    async fn lease_unprocessed(
        &self,
        instance_id: &InstanceId,
        max_retries: u32,
        allowed_types: &[MessageType],
    ) -> Result<Message>;
}
