//! App - background task plumbing shared by the outbox and the inbox.
//!
//! - **TaskGroup**: owns every spawned loop and the shutdown signal
//! - **ReaperLoop**: releases this instance's stale leases

pub mod group;
pub mod reaper_loop;

pub use self::group::{ShutdownSignal, TaskGroup};
pub use self::reaper_loop::ReaperLoop;
