//! The admission state machine.
//!
//! Everything here runs under the queue's single lock. Nothing in this module
//! blocks or fires a signal; it only decides which tickets move where and hands
//! released tickets back to the caller.

use super::types::{Priority, Release, TicketId};
use crate::schedule::Schedule;
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use tokio::sync::oneshot;

/// A queued ticket and the private signal its submitter waits on.
pub(crate) struct PendingTicket {
    pub id: TicketId,
    pub url: String,
    pub submitted_as: Priority,
    /// Low-tier sequence id, assigned on admission.
    pub sequence: Option<u64>,
    pub enqueued_at: Instant,
    pub deadline: Option<Instant>,
    pub signal: oneshot::Sender<Release>,
}

impl PendingTicket {
    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
pub(crate) struct QueueState {
    high: VecDeque<PendingTicket>,
    /// Low tier keyed by sequence id. Ids are handed out under the same lock,
    /// so every id below the smallest key has already left the tier.
    low: BTreeMap<u64, PendingTicket>,
    next_ticket: u64,
    next_sequence: u64,
    next_expected: u64,
    cursor: usize,
    pub paused: bool,
    pub closed: bool,
}

impl QueueState {
    pub fn new(paused: bool) -> Self {
        Self {
            paused,
            ..Self::default()
        }
    }

    pub fn allocate_ticket(&mut self) -> TicketId {
        let id = TicketId(self.next_ticket);
        self.next_ticket += 1;
        id
    }

    /// Advance the cursor for a URL that appears in the schedule and promote
    /// every Low ticket that is now behind it. Returns the promoted ticket ids.
    pub fn observe(&mut self, url: &str, schedule: &Schedule) -> Vec<TicketId> {
        let Some(position) = schedule.position(url) else {
            return Vec::new();
        };
        self.cursor = self.cursor.max(position);
        self.reprioritize(schedule)
    }

    fn reprioritize(&mut self, schedule: &Schedule) -> Vec<TicketId> {
        let cursor = self.cursor;
        let behind: Vec<u64> = self
            .low
            .iter()
            .filter(|(_, ticket)| {
                schedule
                    .position(&ticket.url)
                    .is_some_and(|position| position < cursor)
            })
            .map(|(sequence, _)| *sequence)
            .collect();

        let mut promoted = Vec::with_capacity(behind.len());
        for sequence in behind {
            if let Some(ticket) = self.low.remove(&sequence) {
                promoted.push(ticket.id);
                self.high.push_back(ticket);
            }
        }
        promoted
    }

    /// Place a ticket in the tier matching its priority. Returns the Low-tier
    /// sequence id when one was assigned.
    pub fn admit(&mut self, mut ticket: PendingTicket) -> Option<u64> {
        match ticket.submitted_as {
            Priority::High => {
                self.high.push_back(ticket);
                None
            }
            Priority::Low => {
                let sequence = self.next_sequence;
                self.next_sequence += 1;
                ticket.sequence = Some(sequence);
                self.low.insert(sequence, ticket);
                Some(sequence)
            }
        }
    }

    /// Next ticket to release: the High tier drains first, then the Low tier in
    /// ascending sequence id.
    pub fn pop_next(&mut self) -> Option<(PendingTicket, Priority)> {
        if let Some(ticket) = self.high.pop_front() {
            return Some((ticket, Priority::High));
        }
        let (sequence, ticket) = self.low.pop_first()?;
        self.next_expected = sequence + 1;
        Some((ticket, Priority::Low))
    }

    /// Remove every ticket whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<(PendingTicket, Priority)> {
        let mut expired = Vec::new();

        if self.high.iter().any(|ticket| ticket.is_expired(now)) {
            let (gone, keep): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut self.high)
                .into_iter()
                .partition(|ticket| ticket.is_expired(now));
            self.high = keep;
            expired.extend(gone.into_iter().map(|ticket| (ticket, Priority::High)));
        }

        let stale: Vec<u64> = self
            .low
            .iter()
            .filter(|(_, ticket)| ticket.is_expired(now))
            .map(|(sequence, _)| *sequence)
            .collect();
        for sequence in stale {
            if let Some(ticket) = self.low.remove(&sequence) {
                expired.push((ticket, Priority::Low));
            }
        }

        expired
    }

    /// Earliest deadline among queued tickets.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.high
            .iter()
            .chain(self.low.values())
            .filter_map(|ticket| ticket.deadline)
            .min()
    }

    /// Empty both tiers.
    pub fn drain(&mut self) -> Vec<(PendingTicket, Priority)> {
        let mut drained: Vec<_> = self
            .high
            .drain(..)
            .map(|ticket| (ticket, Priority::High))
            .collect();
        drained.extend(
            std::mem::take(&mut self.low)
                .into_values()
                .map(|ticket| (ticket, Priority::Low)),
        );
        drained
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Queued tickets as `(high, low)`.
    pub fn depth(&self) -> (usize, usize) {
        (self.high.len(), self.low.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ticket(
        state: &mut QueueState,
        priority: Priority,
        url: &str,
    ) -> (PendingTicket, oneshot::Receiver<Release>) {
        let (signal, rx) = oneshot::channel();
        let ticket = PendingTicket {
            id: state.allocate_ticket(),
            url: url.to_string(),
            submitted_as: priority,
            sequence: None,
            enqueued_at: Instant::now(),
            deadline: None,
            signal,
        };
        (ticket, rx)
    }

    fn submit(state: &mut QueueState, schedule: &Schedule, priority: Priority, url: &str) {
        state.observe(url, schedule);
        let (ticket, _rx) = ticket(state, priority, url);
        state.admit(ticket);
    }

    fn release_order(state: &mut QueueState) -> Vec<String> {
        std::iter::from_fn(|| state.pop_next())
            .map(|(ticket, _)| ticket.url)
            .collect()
    }

    #[test]
    fn test_high_tier_is_fifo() {
        let schedule = Schedule::default();
        let mut state = QueueState::new(false);
        for url in ["/1", "/2", "/3"] {
            submit(&mut state, &schedule, Priority::High, url);
        }
        assert_eq!(release_order(&mut state), ["/1", "/2", "/3"]);
    }

    #[test]
    fn test_high_drains_before_low() {
        let schedule = Schedule::default();
        let mut state = QueueState::new(false);
        submit(&mut state, &schedule, Priority::Low, "/low");
        submit(&mut state, &schedule, Priority::High, "/high");
        assert_eq!(release_order(&mut state), ["/high", "/low"]);
    }

    #[test]
    fn test_low_sequence_ids_are_not_reused() {
        let mut state = QueueState::new(false);
        let (a, _ra) = ticket(&mut state, Priority::Low, "/a");
        let (b, _rb) = ticket(&mut state, Priority::Low, "/b");
        assert_eq!(state.admit(a), Some(0));
        state.pop_next();
        assert_eq!(state.admit(b), Some(1));
        assert_eq!(state.next_expected(), 1);
    }

    #[test]
    fn test_promotion_needs_strictly_smaller_position() {
        let schedule: Schedule = ["A", "B", "C"].into_iter().collect();
        let mut state = QueueState::new(false);
        submit(&mut state, &schedule, Priority::Low, "B");
        assert_eq!(state.cursor(), 1);

        // B at position 1 is not behind a cursor of 1.
        assert!(state.observe("A", &schedule).is_empty());
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.depth(), (0, 1));

        let promoted = state.observe("C", &schedule);
        assert_eq!(promoted.len(), 1);
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.depth(), (1, 0));

        let (c, _rx) = ticket(&mut state, Priority::Low, "C");
        state.admit(c);
        assert!(state.observe("C", &schedule).is_empty());
        assert_eq!(state.depth(), (1, 1));
        assert_eq!(release_order(&mut state), ["B", "C"]);
    }

    #[test]
    fn test_promoted_ticket_joins_high_tail() {
        let schedule: Schedule = ["/x", "/y"].into_iter().collect();
        let mut state = QueueState::new(false);
        submit(&mut state, &schedule, Priority::High, "/unlisted-1");
        submit(&mut state, &schedule, Priority::Low, "/x");
        submit(&mut state, &schedule, Priority::High, "/y");
        assert_eq!(release_order(&mut state), ["/unlisted-1", "/x", "/y"]);
    }

    #[test]
    fn test_unscheduled_urls_never_promote() {
        let schedule: Schedule = ["/a", "/b"].into_iter().collect();
        let mut state = QueueState::new(false);
        submit(&mut state, &schedule, Priority::Low, "/unlisted");
        assert!(state.observe("/b", &schedule).is_empty());
        assert_eq!(state.depth(), (0, 1));
    }

    #[test]
    fn test_cursor_never_decreases() {
        let schedule: Schedule = ["/0", "/1", "/2", "/3"].into_iter().collect();
        let mut state = QueueState::new(false);
        let mut last = 0;
        for url in ["/2", "/0", "/3", "/1", "/unlisted", "/0"] {
            state.observe(url, &schedule);
            assert!(state.cursor() >= last);
            last = state.cursor();
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_gap_left_by_promotion_is_skipped() {
        let schedule: Schedule = ["/early", "/late"].into_iter().collect();
        let mut state = QueueState::new(false);
        submit(&mut state, &schedule, Priority::Low, "/early");
        submit(&mut state, &schedule, Priority::Low, "/other");
        // Promotes sequence 0 away; the Low tier must continue with sequence 1.
        submit(&mut state, &schedule, Priority::High, "/late");

        let order: Vec<_> = std::iter::from_fn(|| state.pop_next())
            .map(|(ticket, tier)| (ticket.url, tier))
            .collect();
        assert_eq!(
            order,
            [
                ("/early".to_string(), Priority::High),
                ("/late".to_string(), Priority::High),
                ("/other".to_string(), Priority::Low),
            ]
        );
        assert_eq!(state.next_expected(), 2);
    }

    #[test]
    fn test_expire_removes_from_both_tiers() {
        let mut state = QueueState::new(false);
        let now = Instant::now();
        for (priority, url, deadline) in [
            (Priority::High, "/h-old", Some(now)),
            (Priority::High, "/h-new", None),
            (Priority::Low, "/l-old", Some(now)),
            (Priority::Low, "/l-new", Some(now + Duration::from_secs(60))),
        ] {
            let (mut t, _rx) = ticket(&mut state, priority, url);
            t.deadline = deadline;
            state.admit(t);
        }

        let expired: Vec<_> = state
            .expire(now)
            .into_iter()
            .map(|(t, tier)| (t.url, tier))
            .collect();
        assert_eq!(
            expired,
            [
                ("/h-old".to_string(), Priority::High),
                ("/l-old".to_string(), Priority::Low),
            ]
        );
        assert_eq!(state.depth(), (1, 1));
        assert_eq!(
            state.next_deadline(),
            Some(now + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_drain_empties_everything() {
        let schedule = Schedule::default();
        let mut state = QueueState::new(true);
        submit(&mut state, &schedule, Priority::High, "/h");
        submit(&mut state, &schedule, Priority::Low, "/l1");
        submit(&mut state, &schedule, Priority::Low, "/l2");
        assert_eq!(state.drain().len(), 3);
        assert_eq!(state.depth(), (0, 0));
        assert!(state.drain().is_empty());
    }
}
