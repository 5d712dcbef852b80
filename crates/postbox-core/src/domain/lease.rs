//! Lease bookkeeping for a stored row.

use chrono::{DateTime, Utc};

use super::{InstanceId, Message, MessageType, Publishing};

/// Lifecycle of a stored row.
///
/// State transitions:
/// - Unleased -> Leased -> Processed
/// - Unleased -> Leased -> Unleased (lease reaped, or retry scheduled)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    /// Waiting to be picked up (possibly not before `next_retry_at`).
    Unleased,

    /// Exclusively held by one instance.
    Leased,

    /// Terminal.
    Processed,
}

/// Something that can be stored in a leased table.
pub trait Row: Clone + Send + Sync + 'static {
    fn row_id(&self) -> &str;
    fn row_type(&self) -> &MessageType;
}

impl Row for Message {
    fn row_id(&self) -> &str {
        &self.id
    }

    fn row_type(&self) -> &MessageType {
        &self.message_type
    }
}

impl Row for Publishing {
    fn row_id(&self) -> &str {
        &self.message.id
    }

    fn row_type(&self) -> &MessageType {
        &self.message.message_type
    }
}

/// A row plus its lease state, as a store would keep it.
#[derive(Debug, Clone)]
pub struct LeaseRecord<T> {
    pub row: T,

    /// Number of leases handed out so far.
    pub attempts: u32,

    pub locked_by: Option<InstanceId>,
    pub locked_at: Option<DateTime<Utc>>,

    /// Earliest time the row may be leased again.
    pub next_retry_at: DateTime<Utc>,

    pub processed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T> LeaseRecord<T> {
    pub fn new(row: T, now: DateTime<Utc>) -> Self {
        Self {
            row,
            attempts: 0,
            locked_by: None,
            locked_at: None,
            next_retry_at: now,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> RowState {
        if self.processed_at.is_some() {
            RowState::Processed
        } else if self.locked_by.is_some() {
            RowState::Leased
        } else {
            RowState::Unleased
        }
    }

    /// May this row be leased right now?
    pub fn is_eligible(&self, now: DateTime<Utc>, max_retries: u32) -> bool {
        self.state() == RowState::Unleased
            && self.attempts < max_retries
            && self.next_retry_at <= now
    }

    /// Take the lease for `instance` (counts as one attempt).
    pub fn acquire(&mut self, instance: InstanceId, now: DateTime<Utc>) {
        self.locked_by = Some(instance);
        self.locked_at = Some(now);
        self.attempts += 1;
        self.updated_at = now;
    }

    pub fn release(&mut self, now: DateTime<Utc>) {
        self.locked_by = None;
        self.locked_at = None;
        self.updated_at = now;
    }

    pub fn mark_processed(&mut self, now: DateTime<Utc>) {
        self.release(now);
        self.processed_at = Some(now);
    }

    /// Release the lease and hold the row back until `retry_at`.
    pub fn schedule_retry(&mut self, retry_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.release(now);
        self.next_retry_at = retry_at;
    }

    /// Is this a lease of `instance` taken before `cutoff`?
    pub fn is_stale_lease_of(&self, instance: &InstanceId, cutoff: DateTime<Utc>) -> bool {
        self.state() == RowState::Leased
            && self.locked_by.as_ref() == Some(instance)
            && self.locked_at.is_some_and(|at| at < cutoff)
    }
}
