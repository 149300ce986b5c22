//! Value types shared by the admission state machine and its callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Admission priority, also used to name the tier a ticket is released from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Released ahead of every queued `Low` ticket.
    High,
    /// Released in submission order, unless promoted.
    Low,
}

impl Priority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a ticket left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Release {
    /// Released by the dispatcher in tier order.
    Dispatched,
    /// Released by [`shutdown`](super::AdmissionQueue::shutdown) while still queued.
    Drained,
    /// Waited longer than the configured `max_wait` and was removed from its tier.
    TimedOut,
    /// The queue was already shut down when the ticket was submitted.
    Closed,
}

impl Release {
    pub const fn as_str(self) -> &'static str {
        match self {
            Release::Dispatched => "dispatched",
            Release::Drained => "drained",
            Release::TimedOut => "timed_out",
            Release::Closed => "closed",
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an admitted ticket, unique across both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One release, as reported to observers in release order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    pub ticket: TicketId,
    pub url: String,
    /// Low-tier sequence id, `None` for tickets submitted as `High`.
    pub sequence: Option<u64>,
    /// Priority the ticket was submitted with.
    pub submitted_as: Priority,
    /// Tier the ticket was in when it was released.
    pub released_from: Priority,
    pub outcome: Release,
}

impl DispatchEvent {
    pub fn was_promoted(&self) -> bool {
        self.submitted_as == Priority::Low && self.released_from == Priority::High
    }
}

/// Runtime knobs for an [`AdmissionQueue`](super::AdmissionQueue).
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Upper bound on how long a ticket may stay queued. `None` waits forever.
    pub max_wait: Option<Duration>,
    /// Start with dispatch held until [`resume`](super::AdmissionQueue::resume).
    pub start_paused: bool,
}
