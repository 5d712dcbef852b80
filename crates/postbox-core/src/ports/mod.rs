//! Ports - the seams to the outside world.
//!
//! The store and the broker are external collaborators: the core only talks
//! to them through these traits. `impls` carries in-memory adapters for
//! development and tests; production adapters live outside this crate.

pub mod broker;
pub mod clock;
pub mod id_generator;
pub mod repository;

pub use self::broker::{Consumer, Deliveries, Delivery, Publisher};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::repository::{InboxRepository, LeaseStore, OutboxRepository};
