//! postbox-core
//!
//! Transactional outbox and idempotent inbox over a leased-row store.
//!
//! # Modules
//! - **domain**: messages, publishings, instance ids, lease records
//! - **ports**: repository and broker traits, clock, id generator
//! - **app**: task group with cooperative shutdown, stale-lease reaper
//! - **outbox**: pollable data source and dispatcher
//! - **inbox**: receiver, handler registry, processor
//! - **impls**: in-memory repositories and brokers for development and tests
//! - **retry** / **polling**: retry and polling policies
//! - **error** / **observability**: error type, injected logger

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod inbox;
pub mod observability;
pub mod outbox;
pub mod polling;
pub mod ports;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Code, Error, Result};
pub use observability::Logger;
