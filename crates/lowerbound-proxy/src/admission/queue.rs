use super::state::{PendingTicket, QueueState};
use super::types::{DispatchEvent, Priority, QueueConfig, Release};
use super::AdmissionError;
use crate::metrics;
use crate::schedule::Schedule;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// State shared between submitters and the dispatcher thread.
struct Shared {
    schedule: Schedule,
    max_wait: Option<Duration>,
    state: Mutex<QueueState>,
    /// Signalled on insertion, promotion, resume, and shutdown.
    wake: Condvar,
    /// Only ever locked after `state`.
    observers: Mutex<Vec<Sender<DispatchEvent>>>,
}

impl Shared {
    fn run_dispatcher(&self) {
        debug!("Admission dispatcher started");
        let mut state = self.state.lock();

        // Deadlines only exist with a bounded wait; skip the tier scans otherwise.
        let timed = self.max_wait.is_some();

        while !state.closed {
            if timed {
                for (ticket, tier) in state.expire(Instant::now()) {
                    warn!(
                        "Ticket {} for {} timed out in {} tier after {:?}",
                        ticket.id,
                        ticket.url,
                        tier,
                        ticket.enqueued_at.elapsed()
                    );
                    self.release(ticket, tier, Release::TimedOut);
                }
            }

            if !state.paused {
                if let Some((ticket, tier)) = state.pop_next() {
                    self.release(ticket, tier, Release::Dispatched);
                    continue;
                }
            }

            publish_depth(&state);
            let deadline = if timed { state.next_deadline() } else { None };
            match deadline {
                Some(deadline) => {
                    self.wake.wait_until(&mut state, deadline);
                }
                None => self.wake.wait(&mut state),
            }
        }

        debug!("Admission dispatcher stopped");
    }

    /// Fire a ticket's completion signal. Called with the state lock held.
    fn release(&self, ticket: PendingTicket, tier: Priority, outcome: Release) {
        let waited = ticket.enqueued_at.elapsed();
        metrics::record_release(tier, outcome, waited);
        debug!(
            "Releasing {} ({}) from {} tier: {} after {:?}",
            ticket.url, ticket.id, tier, outcome, waited
        );

        let mut observers = self.observers.lock();
        if !observers.is_empty() {
            let event = DispatchEvent {
                ticket: ticket.id,
                url: ticket.url,
                sequence: ticket.sequence,
                submitted_as: ticket.submitted_as,
                released_from: tier,
                outcome,
            };
            observers.retain(|tx| tx.send(event.clone()).is_ok());
        }

        // The submitter may have gone away (client disconnected).
        let _ = ticket.signal.send(outcome);
    }
}

fn publish_depth(state: &QueueState) {
    let (high, low) = state.depth();
    metrics::set_queue_depth(high, low);
}

/// Two-tier admission gate with schedule-driven promotion.
///
/// Every submitted ticket waits until a single dispatcher thread releases it:
/// the High tier drains first in arrival order, then the Low tier in ascending
/// sequence id. A submission whose URL appears in the schedule advances the
/// schedule cursor, and any queued Low ticket whose schedule position falls
/// strictly behind the cursor is moved to the tail of the High tier.
///
/// All state lives behind one lock, so promotion, dispatch, expiry, and
/// shutdown never observe a ticket in two tiers.
pub struct AdmissionQueue {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionQueue {
    /// Create a queue and start its dispatcher thread.
    pub fn new(schedule: Schedule, config: QueueConfig) -> Result<Self, AdmissionError> {
        let scheduled_urls = schedule.len();
        let shared = Arc::new(Shared {
            schedule,
            max_wait: config.max_wait,
            state: Mutex::new(QueueState::new(config.start_paused)),
            wake: Condvar::new(),
            observers: Mutex::new(Vec::new()),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("admission-dispatcher".to_string())
            .spawn(move || worker.run_dispatcher())
            .map_err(AdmissionError::Spawn)?;

        info!(
            "Admission queue started: {} scheduled URLs, max_wait={:?}, paused={}",
            scheduled_urls, config.max_wait, config.start_paused
        );

        Ok(Self {
            shared,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Load the request-order file and create a queue from it.
    pub fn from_schedule_file<P: AsRef<Path>>(
        path: P,
        config: QueueConfig,
    ) -> Result<Self, AdmissionError> {
        let schedule = Schedule::load(path)?;
        Self::new(schedule, config)
    }

    /// Admit a ticket for `url` and wait until it is released.
    pub async fn submit(&self, priority: Priority, url: impl Into<String>) -> Release {
        match self.enqueue(priority, url.into()) {
            Some(signal) => signal.await.unwrap_or(Release::Drained),
            None => Release::Closed,
        }
    }

    /// Blocking variant of [`submit`](Self::submit) for plain threads.
    ///
    /// Panics if called from within an async runtime.
    pub fn submit_blocking(&self, priority: Priority, url: impl Into<String>) -> Release {
        match self.enqueue(priority, url.into()) {
            Some(signal) => signal.blocking_recv().unwrap_or(Release::Drained),
            None => Release::Closed,
        }
    }

    fn enqueue(&self, priority: Priority, url: String) -> Option<oneshot::Receiver<Release>> {
        let mut state = self.shared.state.lock();
        if state.closed {
            debug!("Queue closed, releasing {} immediately", url);
            metrics::record_release(priority, Release::Closed, Duration::ZERO);
            return None;
        }

        let promoted = state.observe(&url, &self.shared.schedule);
        if !promoted.is_empty() {
            debug!(
                "Cursor at {}: promoted {} low-priority tickets",
                state.cursor(),
                promoted.len()
            );
            metrics::record_promotions(promoted.len());
        }
        metrics::set_schedule_cursor(state.cursor());

        let (signal, waiter) = oneshot::channel();
        let now = Instant::now();
        let ticket = PendingTicket {
            id: state.allocate_ticket(),
            url,
            submitted_as: priority,
            sequence: None,
            enqueued_at: now,
            deadline: self.shared.max_wait.map(|wait| now + wait),
            signal,
        };
        debug!(
            "Queuing {} ({}) with priority {}",
            ticket.url, ticket.id, priority
        );
        state.admit(ticket);
        metrics::record_admission(priority);
        publish_depth(&state);
        drop(state);

        self.shared.wake.notify_one();
        Some(waiter)
    }

    /// Hold dispatch. Submissions keep queuing and promotion keeps running.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    /// Resume dispatch after [`pause`](Self::pause).
    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.wake.notify_one();
    }

    /// Release every queued ticket, refuse new ones, and stop the dispatcher.
    ///
    /// Safe to call more than once; also runs on drop.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if !state.closed {
                state.closed = true;
                let drained = state.drain();
                if !drained.is_empty() {
                    info!("Draining {} queued tickets on shutdown", drained.len());
                }
                for (ticket, tier) in drained {
                    self.shared.release(ticket, tier, Release::Drained);
                }
                publish_depth(&state);
            }
        }
        self.shared.wake.notify_all();

        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                warn!("Admission dispatcher panicked");
            }
        }
    }

    /// Receive one [`DispatchEvent`] per release, in release order.
    pub fn subscribe(&self) -> Receiver<DispatchEvent> {
        let (tx, rx) = unbounded();
        self.shared.observers.lock().push(tx);
        rx
    }

    /// Furthest schedule position observed so far.
    pub fn cursor(&self) -> usize {
        self.shared.state.lock().cursor()
    }

    /// Queued tickets as `(high, low)`.
    pub fn depth(&self) -> (usize, usize) {
        self.shared.state.lock().depth()
    }

    /// Sequence id the Low tier will release next if it is still queued.
    pub fn next_expected(&self) -> u64 {
        self.shared.state.lock().next_expected()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub fn schedule(&self) -> &Schedule {
        &self.shared.schedule
    }
}

impl Drop for AdmissionQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
