//! Logging handle and row counters.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::instrument::{Instrument, Instrumented, WithDispatch, WithSubscriber};
use tracing::{Dispatch, Span, Subscriber};

/// Logger handed to every component at construction.
///
/// Wraps a [`tracing::Dispatch`]. Background loops run inside that dispatch,
/// so their events never go to whatever subscriber happens to be the process
/// default. There is no `Default`; use [`Logger::disabled`] to drop events.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn from_subscriber<S>(subscriber: S) -> Self
    where
        S: Subscriber + Send + Sync + 'static,
    {
        Self::new(Dispatch::new(subscriber))
    }

    /// Logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(Dispatch::none())
    }

    /// Build a span against this logger's subscriber.
    pub fn span(&self, make: impl FnOnce() -> Span) -> Span {
        tracing::dispatcher::with_default(&self.dispatch, make)
    }

    /// Run `fut` inside this logger's subscriber.
    pub fn scope<F: Future>(&self, fut: F) -> WithDispatch<F> {
        fut.with_subscriber(self.dispatch.clone())
    }

    /// Run `fut` inside this logger's subscriber and inside a span built by
    /// `make`.
    pub fn in_span<F: Future>(
        &self,
        fut: F,
        make: impl FnOnce() -> Span,
    ) -> WithDispatch<Instrumented<F>> {
        let span = self.span(make);
        self.scope(fut.instrument(span))
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Snapshot of a leased table by row state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub unleased: usize,
    pub leased: usize,
    pub processed: usize,
}

impl RowCounts {
    pub fn total(&self) -> usize {
        self.unleased + self.leased + self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata};

    /// Counts events; enough to tell which subscriber received them.
    #[derive(Clone, Default)]
    struct CountingSubscriber {
        events: Arc<AtomicUsize>,
        spans: Arc<AtomicUsize>,
    }

    impl Subscriber for CountingSubscriber {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }
        fn new_span(&self, _: &Attributes<'_>) -> Id {
            let n = self.spans.fetch_add(1, Ordering::SeqCst);
            Id::from_u64(n as u64 + 1)
        }
        fn record(&self, _: &Id, _: &Record<'_>) {}
        fn record_follows_from(&self, _: &Id, _: &Id) {}
        fn event(&self, _: &Event<'_>) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }
        fn enter(&self, _: &Id) {}
        fn exit(&self, _: &Id) {}
    }

    #[tokio::test]
    async fn scoped_futures_log_to_the_injected_subscriber() {
        let sub = CountingSubscriber::default();
        let logger = Logger::from_subscriber(sub.clone());

        logger
            .in_span(
                async {
                    tracing::info!("inside");
                },
                || tracing::info_span!("component"),
            )
            .await;

        assert_eq!(sub.events.load(Ordering::SeqCst), 1);
        assert_eq!(sub.spans.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_logger_swallows_events() {
        let logger = Logger::disabled();
        logger
            .scope(async {
                tracing::error!("nobody hears this");
            })
            .await;
    }

    #[test]
    fn counts_total() {
        let counts = RowCounts {
            unleased: 1,
            leased: 2,
            processed: 3,
        };
        assert_eq!(counts.total(), 6);
    }
}
