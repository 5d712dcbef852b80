//! Dispatcher - publishes what the data source hands out.
//!
//! For each publishing the dispatcher
//! 1. sends it through the [`Publisher`] under the [`Retrier`];
//! 2. on exhaustion, reports it on the failed-publishings channel;
//! 3. marks it processed, whether or not the send succeeded.
//!
//! The failed-publishings channel holds [`FAILED_PUBLISHINGS_CAPACITY`]
//! entries. When nobody drains it the dispatcher blocks on the report and
//! stops taking new rows until there is room or shutdown is requested.
//!
//! Shutdown during the retry schedule hands the row back to the data source
//! unsent. Shutdown while blocked on a report drops the report (logged at
//! `error`) and still marks the row processed.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::{DataSource, FailedPublishing};
use crate::app::{ShutdownSignal, TaskGroup};
use crate::domain::Publishing;
use crate::error::{Error, Result};
use crate::observability::Logger;
use crate::ports::Publisher;
use crate::retry::Retrier;

pub const FAILED_PUBLISHINGS_CAPACITY: usize = 10;

pub struct Dispatcher {
    source: Arc<dyn DataSource>,
    publisher: Arc<dyn Publisher>,
    retrier: Retrier,
    failed_tx: mpsc::Sender<FailedPublishing>,
    failed_rx: Option<mpsc::Receiver<FailedPublishing>>,
    logger: Logger,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn DataSource>,
        publisher: Arc<dyn Publisher>,
        retrier: Retrier,
        logger: Logger,
    ) -> Self {
        let (failed_tx, failed_rx) = mpsc::channel(FAILED_PUBLISHINGS_CAPACITY);
        Self {
            source,
            publisher,
            retrier,
            failed_tx,
            failed_rx: Some(failed_rx),
            logger,
        }
    }

    /// Take the receiving end of the failed-publishings channel.
    /// Only the first call returns `Some`.
    pub fn failed_publishings(&mut self) -> Option<mpsc::Receiver<FailedPublishing>> {
        self.failed_rx.take()
    }

    /// Start the data source and the dispatch loop on `tasks`.
    pub async fn start(&self, tasks: &mut TaskGroup) -> Result<()> {
        let publishings = self
            .source
            .unsent_publishings(tasks)
            .await
            .map_err(|e| Error::op("outbox.Dispatcher.start").wrap(e))?;

        let worker = DispatchLoop {
            source: self.source.clone(),
            publisher: self.publisher.clone(),
            retrier: self.retrier.clone(),
            failed: self.failed_tx.clone(),
        };
        let signal = tasks.shutdown_signal();
        tasks.spawn(
            self.logger
                .in_span(worker.run(publishings, signal), || tracing::info_span!("outbox.dispatcher")),
        );
        Ok(())
    }
}

struct DispatchLoop {
    source: Arc<dyn DataSource>,
    publisher: Arc<dyn Publisher>,
    retrier: Retrier,
    failed: mpsc::Sender<FailedPublishing>,
}

impl DispatchLoop {
    async fn run(self, mut publishings: mpsc::UnboundedReceiver<Publishing>, mut shutdown: ShutdownSignal) {
        loop {
            let publishing = tokio::select! {
                _ = shutdown.recv() => break,
                next = publishings.recv() => match next {
                    Some(p) => p,
                    None => break,
                },
            };
            if !self.dispatch(publishing, &mut shutdown).await {
                break;
            }
        }
        tracing::debug!("dispatcher stopped");
    }

    /// Returns `false` when shutdown interrupted the row.
    async fn dispatch(&self, publishing: Publishing, shutdown: &mut ShutdownSignal) -> bool {
        let sent = tokio::select! {
            sent = self.retrier.retry(|| self.publisher.send(&publishing)) => sent,
            _ = shutdown.recv() => {
                tracing::info!(id = publishing.id(), "shutdown while publishing; handing the row back");
                if let Err(e) = self.source.retry_message(publishing.id()).await {
                    tracing::warn!(id = publishing.id(), error = %e, "could not hand publishing back");
                }
                return false;
            }
        };

        let id = publishing.id().to_string();
        let err = match sent {
            Ok(()) => {
                tracing::debug!(id = %id, topic = %publishing.topic, "published");
                self.mark_processed(&id).await;
                return true;
            }
            Err(err) => err,
        };

        tracing::error!(id = %id, error = %err, "publishing failed after all retries");
        let failed = FailedPublishing {
            publishing,
            error: Error::op("outbox.Dispatcher.dispatch").wrap(err),
        };

        let keep_going = tokio::select! {
            reported = self.failed.send(failed) => {
                if reported.is_err() {
                    tracing::warn!(id = %id, "failed-publishings receiver dropped");
                }
                true
            }
            _ = shutdown.recv() => {
                tracing::error!(id = %id, "shutdown while reporting failed publishing; report lost");
                false
            }
        };
        self.mark_processed(&id).await;
        keep_going
    }

    async fn mark_processed(&self, id: &str) {
        if let Err(e) = self.source.set_as_processed(id).await {
            tracing::warn!(id = %id, error = %e, "could not mark publishing as processed");
        }
    }
}
