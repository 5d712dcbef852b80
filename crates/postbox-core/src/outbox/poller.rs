//! Row-lease data source.
//!
//! Turns an [`OutboxRepository`] into a stream of leased publishings:
//! - a polling loop leases one eligible row per `polling_interval` and pushes
//!   it onto the stream;
//! - a [`ReaperLoop`] releases this instance's leases older than
//!   `max_lock_age`.
//!
//! At most one handed-out row is unsettled at a time. The polling loop does
//! not lease again until the consumer calls `set_as_processed` or
//! `retry_message` for it, so a row released by the reaper while the
//! consumer is stalled is never leased a second time by this instance.
//!
//! Store errors never stop the polling loop. `NotFound` is the idle case and
//! only shows up at debug level.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, mpsc};

use super::DataSource;
use crate::app::{ReaperLoop, ShutdownSignal, TaskGroup};
use crate::domain::{InstanceId, Publishing};
use crate::error::{Code, Error, Result};
use crate::observability::Logger;
use crate::polling::PollingPolicy;
use crate::ports::clock::{self, Clock};
use crate::ports::{IdGenerator, OutboxRepository, SystemClock, UlidGenerator};

const MAX_IN_FLIGHT: usize = 1;

/// Rows handed to the consumer and not settled yet.
struct HandOff {
    permits: Semaphore,
    in_flight: Mutex<HashSet<String>>,
}

impl HandOff {
    fn new() -> Self {
        Self {
            permits: Semaphore::new(MAX_IN_FLIGHT),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    async fn hand_out(&self, id: &str) {
        self.in_flight.lock().await.insert(id.to_string());
    }

    /// Returns the permit if `id` was handed out by the polling loop.
    async fn settle(&self, id: &str) {
        if self.in_flight.lock().await.remove(id) {
            self.permits.add_permits(1);
        }
    }
}

#[derive(Clone)]
pub struct PollableDataSource {
    repo: Arc<dyn OutboxRepository>,
    policy: PollingPolicy,
    instance_id: InstanceId,
    clock: Arc<dyn Clock>,
    hand_off: Arc<HandOff>,
    logger: Logger,
}

impl PollableDataSource {
    pub fn new(repo: Arc<dyn OutboxRepository>, policy: PollingPolicy, logger: Logger) -> Self {
        Self::with_clock(repo, policy, logger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repo: Arc<dyn OutboxRepository>,
        policy: PollingPolicy,
        logger: Logger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let instance_id = UlidGenerator::new(clock.clone()).generate_instance_id();
        Self {
            repo,
            policy,
            instance_id,
            clock,
            hand_off: Arc::new(HandOff::new()),
            logger,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn policy(&self) -> &PollingPolicy {
        &self.policy
    }

    /// Try to lease one row. `Ok(None)` when nothing is eligible.
    pub async fn poll_once(&self) -> Result<Option<Publishing>> {
        self.logger.scope(self.lease_next()).await
    }

    async fn lease_next(&self) -> Result<Option<Publishing>> {
        match self
            .repo
            .lease_unsent(&self.instance_id, self.policy.max_retries)
            .await
        {
            Ok(publishing) => Ok(Some(publishing)),
            Err(e) if e.is(Code::NotFound) => {
                tracing::debug!("no unsent publishings");
                Ok(None)
            }
            Err(e) => Err(Error::op("outbox.PollableDataSource.poll_once").wrap(e)),
        }
    }

    async fn run_polling(self, publishings: mpsc::UnboundedSender<Publishing>, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.policy.polling_interval) => {}
            }
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = self.hand_off.permits.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            match self.lease_next().await {
                Ok(Some(publishing)) => {
                    tracing::debug!(id = publishing.id(), "leased publishing");
                    permit.forget();
                    self.hand_off.hand_out(publishing.id()).await;
                    if publishings.send(publishing).is_err() {
                        tracing::debug!("publishing stream closed");
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "error getting unsent publishings"),
            }
        }
        tracing::debug!("poller stopped");
    }
}

#[async_trait]
impl DataSource for PollableDataSource {
    async fn unsent_publishings(&self, tasks: &mut TaskGroup) -> Result<mpsc::UnboundedReceiver<Publishing>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let instance = self.instance_id;

        let signal = tasks.shutdown_signal();
        tasks.spawn(self.logger.in_span(self.clone().run_polling(tx, signal), || {
            tracing::info_span!("outbox.poller", %instance)
        }));

        let reaper = ReaperLoop::new(
            self.repo.clone(),
            instance,
            self.policy.clone(),
            self.clock.clone(),
        );
        let signal = tasks.shutdown_signal();
        tasks.spawn(
            self.logger
                .in_span(reaper.run(signal), || tracing::info_span!("outbox.reaper", %instance)),
        );

        Ok(rx)
    }

    async fn set_as_processed(&self, id: &str) -> Result<()> {
        let marked = self
            .repo
            .set_as_processed(id)
            .await
            .map_err(|e| Error::op("outbox.PollableDataSource.set_as_processed").wrap(e));
        self.hand_off.settle(id).await;
        marked
    }

    /// Release the row and make it eligible again after `retry_interval`.
    async fn retry_message(&self, id: &str) -> Result<()> {
        let retry_at = clock::after(self.clock.now(), self.policy.retry_interval);
        let marked = self
            .repo
            .mark_for_retry(id, retry_at)
            .await
            .map_err(|e| Error::op("outbox.PollableDataSource.retry_message").wrap(e));
        self.hand_off.settle(id).await;
        marked
    }
}
