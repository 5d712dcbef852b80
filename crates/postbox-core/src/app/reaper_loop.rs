//! ReaperLoop - releases stale leases.
//!
//! Every `locking_interval` the reaper asks the store to clear all leases of
//! this instance older than `max_lock_age`. Rows that were leased but never
//! marked (the publish or handler call hung, or the row was dropped from the
//! in-process channel during shutdown) go back to the unleased pool.

use std::sync::Arc;

use crate::app::ShutdownSignal;
use crate::domain::InstanceId;
use crate::error::{Error, Result};
use crate::polling::PollingPolicy;
use crate::ports::clock::{self, Clock};
use crate::ports::LeaseStore;

pub struct ReaperLoop<R: ?Sized> {
    store: Arc<R>,
    instance_id: InstanceId,
    policy: PollingPolicy,
    clock: Arc<dyn Clock>,
}

impl<R: LeaseStore + ?Sized> ReaperLoop<R> {
    pub fn new(store: Arc<R>, instance_id: InstanceId, policy: PollingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            instance_id,
            policy,
            clock,
        }
    }

    /// One sweep. Returns the number of leases released.
    pub async fn reap_once(&self) -> Result<usize> {
        let cutoff = clock::before(self.clock.now(), self.policy.max_lock_age);
        self.store
            .clear_locks(&self.instance_id, cutoff)
            .await
            .map_err(|e| Error::op("app.ReaperLoop.reap_once").wrap(e))
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.policy.locking_interval) => {}
            }
            match self.reap_once().await {
                Ok(0) => {}
                Ok(released) => tracing::info!(released, "released stale leases"),
                Err(e) => tracing::warn!(error = %e, "error clearing locks"),
            }
        }
        tracing::debug!("reaper stopped");
    }
}
