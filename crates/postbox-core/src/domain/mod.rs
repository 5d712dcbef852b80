//! Domain model: messages, identifiers and lease bookkeeping.

pub mod ids;
pub mod lease;
pub mod message;

pub use ids::InstanceId;
pub use lease::{LeaseRecord, Row, RowState};
pub use message::{Message, MessageType, Publishing, Topic};
