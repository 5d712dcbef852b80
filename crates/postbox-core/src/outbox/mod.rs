//! Transactional outbox.
//!
//! The application writes its business row and a [`Publishing`] row in one
//! local transaction. A [`PollableDataSource`] leases unsent rows out of the
//! store and streams them to the [`Dispatcher`], which publishes each one
//! through the broker under a [`Retrier`](crate::retry::Retrier) and marks it
//! processed. Rows that exhaust their retries are reported on the
//! failed-publishings channel, never dropped.

pub mod dispatcher;
pub mod poller;

pub use self::dispatcher::{Dispatcher, FAILED_PUBLISHINGS_CAPACITY};
pub use self::poller::PollableDataSource;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::app::TaskGroup;
use crate::domain::Publishing;
use crate::error::{Error, Result};

/// Source of publishings that still have to go out.
///
/// Every publishing handed out must be settled with either
/// `set_as_processed` or `retry_message`.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Start producing unsent publishings; background work is spawned on
    /// `tasks` and stops with it.
    async fn unsent_publishings(&self, tasks: &mut TaskGroup) -> Result<mpsc::UnboundedReceiver<Publishing>>;

    async fn set_as_processed(&self, id: &str) -> Result<()>;

    /// Give the publishing back; it becomes eligible again after the
    /// source's retry interval.
    async fn retry_message(&self, id: &str) -> Result<()>;
}

/// A publishing that could not be sent within the retry budget.
/// The row is marked processed right after the report is accepted;
/// recovering it is up to whoever drains the channel.
#[derive(Debug)]
pub struct FailedPublishing {
    pub publishing: Publishing,
    pub error: Error,
}
