//! Inbox: idempotent receipt and deferred processing of inbound messages.
//!
//! The [`Receiver`] persists each broker delivery before acknowledging it,
//! using the message id as the deduplication key. The [`Processor`] leases
//! stored messages of the types it has handlers for, runs the handler and
//! marks the row processed or schedules a retry.

pub mod handler;
pub mod processor;
pub mod receiver;

pub use self::handler::{HandlerRegistry, MessageHandler, RegistryError, handler_fn};
pub use self::processor::{PollOutcome, Processor};
pub use self::receiver::{Receiver, Settlement};
