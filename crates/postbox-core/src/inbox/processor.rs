//! Processor - leases stored messages and runs their handlers.
//!
//! Each `polling_interval` the processor leases one unprocessed message whose
//! type has a registered handler. A handler success marks the row processed;
//! a handler error releases it with `next_retry_at = now + retry_interval`.
//! Once a row has been leased `max_retries` times it is never leased again.
//! A [`ReaperLoop`] releases this instance's stale leases.

use std::sync::Arc;

use crate::app::{ReaperLoop, ShutdownSignal, TaskGroup};
use crate::domain::{InstanceId, MessageType};
use crate::error::{Code, Error, Result};
use crate::inbox::HandlerRegistry;
use crate::observability::Logger;
use crate::polling::PollingPolicy;
use crate::ports::clock::{self, Clock};
use crate::ports::{IdGenerator, InboxRepository, SystemClock, UlidGenerator};

/// Result of one processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing eligible.
    Idle,
    Processed(String),
    /// The handler failed; the message is scheduled for another attempt.
    Retried(String),
}

#[derive(Clone)]
pub struct Processor {
    repo: Arc<dyn InboxRepository>,
    handlers: Arc<HandlerRegistry>,
    message_types: Arc<[MessageType]>,
    policy: PollingPolicy,
    instance_id: InstanceId,
    clock: Arc<dyn Clock>,
    logger: Logger,
}

impl Processor {
    pub fn new(
        repo: Arc<dyn InboxRepository>,
        handlers: Arc<HandlerRegistry>,
        policy: PollingPolicy,
        logger: Logger,
    ) -> Self {
        Self::with_clock(repo, handlers, policy, logger, Arc::new(SystemClock))
    }

    pub fn with_clock(
        repo: Arc<dyn InboxRepository>,
        handlers: Arc<HandlerRegistry>,
        policy: PollingPolicy,
        logger: Logger,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let instance_id = UlidGenerator::new(clock.clone()).generate_instance_id();
        let message_types = handlers.message_types().into();
        Self {
            repo,
            handlers,
            message_types,
            policy,
            instance_id,
            clock,
            logger,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Lease and handle at most one message.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        self.logger.scope(self.process_next()).await
    }

    /// Spawn the processing loop and the reaper on `tasks`.
    pub fn start(&self, tasks: &mut TaskGroup) {
        let instance = self.instance_id;

        let signal = tasks.shutdown_signal();
        tasks.spawn(self.logger.in_span(self.clone().run(signal), || {
            tracing::info_span!("inbox.processor", %instance)
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
                .in_span(reaper.run(signal), || tracing::info_span!("inbox.reaper", %instance)),
        );
    }

    async fn run(self, mut shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.policy.polling_interval) => {}
            }
            if let Err(e) = self.process_next().await {
                tracing::warn!(error = %e, "error processing inbox messages");
            }
        }
        tracing::debug!("processor stopped");
    }

    async fn process_next(&self) -> Result<PollOutcome> {
        let message = match self
            .repo
            .lease_unprocessed(&self.instance_id, self.policy.max_retries, &self.message_types)
            .await
        {
            Ok(message) => message,
            Err(e) if e.is(Code::NotFound) => {
                tracing::debug!("no unprocessed messages");
                return Ok(PollOutcome::Idle);
            }
            Err(e) => return Err(Error::op("inbox.Processor.poll_once").wrap(e)),
        };

        match self.handlers.dispatch(&message).await {
            Ok(()) => {
                self.repo
                    .set_as_processed(&message.id)
                    .await
                    .map_err(|e| Error::op("inbox.Processor.poll_once").wrap(e))?;
                tracing::debug!(id = %message.id, "message processed");
                Ok(PollOutcome::Processed(message.id))
            }
            Err(err) => {
                tracing::warn!(id = %message.id, error = %err, "handler failed; scheduling retry");
                let retry_at = clock::after(self.clock.now(), self.policy.retry_interval);
                self.repo
                    .mark_for_retry(&message.id, retry_at)
                    .await
                    .map_err(|e| Error::op("inbox.Processor.poll_once").wrap(e))?;
                Ok(PollOutcome::Retried(message.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, RowState};
    use crate::impls::InMemoryInboxRepository;
    use crate::inbox::handler_fn;
    use crate::ports::FixedClock;
    use crate::test_support::eventually;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn message(id: &str, message_type: &str) -> Message {
        Message::new(id, message_type, br#"{"name":"ada"}"#.to_vec())
    }

    fn registry(message_type: &str, fail_first: usize, calls: Arc<AtomicUsize>) -> Arc<HandlerRegistry> {
        let mut reg = HandlerRegistry::new();
        reg.register(
            message_type,
            handler_fn(move |_| {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < fail_first {
                        Err(Error::message("handler failed"))
                    } else {
                        Ok(())
                    }
                }
            }),
        )
        .unwrap();
        Arc::new(reg)
    }

    #[tokio::test]
    async fn success_marks_processed() {
        let repo = Arc::new(InMemoryInboxRepository::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = Processor::new(
            repo.clone(),
            registry("user.created", 0, calls.clone()),
            PollingPolicy::default(),
            Logger::disabled(),
        );
        repo.save_message(&message("m1", "user.created")).await.unwrap();

        assert_eq!(
            processor.poll_once().await.unwrap(),
            PollOutcome::Processed("m1".to_string())
        );
        assert!(repo.is_processed("m1").await);
        assert_eq!(processor.poll_once().await.unwrap(), PollOutcome::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unregistered_types_are_left_alone() {
        let repo = Arc::new(InMemoryInboxRepository::new());
        let processor = Processor::new(
            repo.clone(),
            registry("user.created", 0, Arc::new(AtomicUsize::new(0))),
            PollingPolicy::default(),
            Logger::disabled(),
        );
        repo.save_message(&message("m1", "user.deleted")).await.unwrap();

        assert_eq!(processor.poll_once().await.unwrap(), PollOutcome::Idle);
        assert_eq!(repo.record("m1").await.unwrap().state(), RowState::Unleased);
    }

    #[tokio::test]
    async fn failures_are_retried_until_the_attempt_cap() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let repo = Arc::new(InMemoryInboxRepository::with_clock(clock.clone()));
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = Processor::with_clock(
            repo.clone(),
            registry("user.created", usize::MAX, calls.clone()),
            PollingPolicy::default(),
            Logger::disabled(),
            clock.clone(),
        );
        repo.save_message(&message("m1", "user.created")).await.unwrap();

        assert_eq!(
            processor.poll_once().await.unwrap(),
            PollOutcome::Retried("m1".to_string())
        );
        let rec = repo.record("m1").await.unwrap();
        assert_eq!(rec.state(), RowState::Unleased);
        assert_eq!(rec.attempts, 1);
        assert_eq!(rec.next_retry_at, start + chrono::Duration::seconds(30));

        // not eligible before the retry interval elapses
        assert_eq!(processor.poll_once().await.unwrap(), PollOutcome::Idle);

        for attempt in 2..=3 {
            clock.advance(Duration::from_secs(30));
            assert_eq!(
                processor.poll_once().await.unwrap(),
                PollOutcome::Retried("m1".to_string())
            );
            assert_eq!(repo.record("m1").await.unwrap().attempts, attempt);
        }

        clock.advance(Duration::from_secs(30));
        assert_eq!(processor.poll_once().await.unwrap(), PollOutcome::Idle);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(!repo.is_processed("m1").await);
    }

    #[tokio::test]
    async fn loop_processes_after_a_transient_failure() {
        let repo = Arc::new(InMemoryInboxRepository::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = PollingPolicy::default()
            .with_polling_interval(Duration::from_millis(5))
            .with_retries(3, Duration::from_millis(20));
        let processor = Processor::new(
            repo.clone(),
            registry("user.created", 1, calls.clone()),
            policy,
            Logger::disabled(),
        );
        let mut tasks = TaskGroup::new();
        processor.start(&mut tasks);
        assert_eq!(tasks.len(), 2);

        repo.save_message(&message("m1", "user.created")).await.unwrap();

        assert!(eventually(|| async { repo.is_processed("m1").await }).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(repo.record("m1").await.unwrap().attempts, 2);

        tokio::time::timeout(Duration::from_secs(1), tasks.shutdown_and_join())
            .await
            .unwrap();
    }
}
