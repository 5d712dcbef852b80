//! Table of leased rows shared by the in-memory repositories.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{InstanceId, LeaseRecord, Row, RowState};
use crate::error::{Error, Result};
use crate::observability::RowCounts;
use crate::ports::Clock;

/// Rows keyed by id.
///
/// Every operation runs under one lock, so selecting an eligible row and
/// writing its lease is a single atomic step.
pub(crate) struct LeaseTable<T> {
    rows: Mutex<BTreeMap<String, LeaseRecord<T>>>,
    clock: Arc<dyn Clock>,
}

impl<T: Row> LeaseTable<T> {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    pub(crate) async fn insert(&self, row: T) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let id = row.row_id().to_string();
        if rows.contains_key(&id) {
            return Err(Error::exists(format!("message {id} already exists")));
        }
        rows.insert(id, LeaseRecord::new(row, self.clock.now()));
        Ok(())
    }

    pub(crate) async fn acquire<F>(&self, instance: &InstanceId, max_retries: u32, accept: F) -> Result<T>
    where
        F: Fn(&T) -> bool + Send,
    {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let record = rows
            .values_mut()
            .find(|r| r.is_eligible(now, max_retries) && accept(&r.row))
            .ok_or_else(|| Error::not_found("no eligible rows"))?;
        record.acquire(*instance, now);
        Ok(record.row.clone())
    }

    pub(crate) async fn set_as_processed(&self, id: &str) -> Result<()> {
        let now = self.clock.now();
        self.with_record(id, |r| r.mark_processed(now)).await
    }

    pub(crate) async fn mark_for_retry(&self, id: &str, retry_at: DateTime<Utc>) -> Result<()> {
        let now = self.clock.now();
        self.with_record(id, |r| r.schedule_retry(retry_at, now)).await
    }

    pub(crate) async fn clear_locks(&self, instance: &InstanceId, leased_before: DateTime<Utc>) -> usize {
        let now = self.clock.now();
        let mut rows = self.rows.lock().await;
        let mut released = 0;
        for record in rows.values_mut() {
            if record.is_stale_lease_of(instance, leased_before) {
                record.release(now);
                released += 1;
            }
        }
        released
    }

    pub(crate) async fn record(&self, id: &str) -> Option<LeaseRecord<T>> {
        self.rows.lock().await.get(id).cloned()
    }

    pub(crate) async fn counts(&self) -> RowCounts {
        let rows = self.rows.lock().await;
        let mut counts = RowCounts::default();
        for record in rows.values() {
            match record.state() {
                RowState::Unleased => counts.unleased += 1,
                RowState::Leased => counts.leased += 1,
                RowState::Processed => counts.processed += 1,
            }
        }
        counts
    }

    async fn with_record(&self, id: &str, f: impl FnOnce(&mut LeaseRecord<T>)) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let record = rows
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("message {id} not found")))?;
        f(record);
        Ok(())
    }
}
