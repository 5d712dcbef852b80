//! In-memory adapters for development and tests.
//!
//! They honour the same contracts a database / broker adapter must: atomic
//! lease acquisition, `NotFound` when nothing is eligible, `Exists` on a
//! duplicate inbox save.

mod lease_table;

pub mod inmem_broker;
pub mod inmem_inbox;
pub mod inmem_outbox;
pub mod noop;

pub use self::inmem_broker::InMemoryBroker;
pub use self::inmem_inbox::InMemoryInboxRepository;
pub use self::inmem_outbox::InMemoryOutboxRepository;
pub use self::noop::NoopBroker;
