//! Response admission scheduling.
//!
//! Every intercepted response is held by the [`AdmissionQueue`] until its
//! ticket is released, which lets the proxy hand resources to the client in an
//! order that approximates a recorded fetch order instead of upstream
//! completion order.
//!
//! # Module Structure
//!
//! - `types` - priorities, release outcomes, dispatch events, queue config
//! - `state` - the two-tier state machine (promotion, dispatch order, expiry)
//! - `queue` - the dispatcher thread and the public submit/shutdown API

mod queue;
mod state;
mod types;


use crate::schedule::ScheduleError;

pub use queue::AdmissionQueue;
pub use types::{DispatchEvent, Priority, QueueConfig, Release, TicketId};

/// Failure to construct an [`AdmissionQueue`].
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("failed to spawn admission dispatcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}
