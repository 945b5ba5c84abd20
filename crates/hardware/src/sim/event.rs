//! Discrete-event queue.
//!
//! The queue is the single source of time in a simulation. It provides:
//! 1. **Ordering:** Events are dispatched in ascending `(cycle, sequence)` order; the
//!    sequence number is assigned at scheduling time and breaks same-cycle ties.
//! 2. **Progress:** Every event lands at least one cycle in the future, so a cycle can
//!    never be re-entered once its dispatch has begun.
//! 3. **Cancellation:** Events are tombstoned in place; dispatching a tombstone is a no-op.
//! 4. **Runaway detection:** A bound on events per cycle turns accidental event loops into
//!    an error instead of a hang.
//!
//! Handlers receive the queue mutably while they run and schedule follow-up events on it.
//! A handler error aborts the run unchanged.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use tracing::{error, warn};

use crate::common::addr::Cycle;
use crate::common::error::{EventError, SimError};

/// Identity of a scheduled event: its target cycle and sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle {
    cycle: Cycle,
    seq: u64,
}

impl EventHandle {
    /// Cycle at which the event fires.
    pub const fn cycle(self) -> Cycle {
        self.cycle
    }

    /// Sequence number breaking ties within the cycle.
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

/// Receiver of dispatched events.
///
/// One handler owns all simulated state; the queue passes itself back so the handler can
/// schedule further events.
pub trait EventHandler {
    /// Payload type carried by events.
    type Event;

    /// Processes one event at `queue.now()`.
    ///
    /// # Errors
    ///
    /// Any error aborts the run and is returned from `EventQueue::run`.
    fn handle(
        &mut self,
        event: Self::Event,
        queue: &mut EventQueue<Self::Event>,
    ) -> Result<(), SimError>;
}

/// Why a run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// No events remain.
    Drained,
    /// The next event lies beyond the cycle limit.
    CycleLimit,
}

/// Summary returned by `EventQueue::run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the run stopped.
    pub finish: FinishReason,
    /// Cycle of the last dispatched event (or the limit).
    pub cycle: Cycle,
    /// Events dispatched during this run.
    pub dispatched: u64,
    /// Tombstoned events discarded during this run.
    pub cancelled: u64,
}

/// One dispatched event, recorded when tracing is enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Dispatch cycle.
    pub cycle: Cycle,
    /// Sequence number.
    pub seq: u64,
    /// Debug rendering of the payload.
    pub event: String,
}

#[derive(Debug)]
struct Slot<E> {
    event: E,
    cancelled: bool,
}

/// Priority queue of timed events.
#[derive(Debug)]
pub struct EventQueue<E> {
    events: BTreeMap<EventHandle, Slot<E>>,
    now: Cycle,
    next_seq: u64,
    live: usize,
    cycle_dispatched: u64,
    max_events_per_cycle: u64,
    overload_threshold: usize,
    overload_warned: bool,
    total_dispatched: u64,
    trace: Option<Vec<TraceRecord>>,
}

impl<E> EventQueue<E> {
    /// Creates an empty queue at cycle 0.
    ///
    /// # Arguments
    ///
    /// * `max_events_per_cycle` - Dispatch bound per cycle.
    /// * `overload_threshold` - Pending-event count that triggers a one-time warning.
    pub const fn new(max_events_per_cycle: u64, overload_threshold: usize) -> Self {
        Self {
            events: BTreeMap::new(),
            now: 0,
            next_seq: 0,
            live: 0,
            cycle_dispatched: 0,
            max_events_per_cycle,
            overload_threshold,
            overload_warned: false,
            total_dispatched: 0,
            trace: None,
        }
    }

    /// Current cycle.
    #[inline]
    pub const fn now(&self) -> Cycle {
        self.now
    }

    /// Number of pending events that have not been cancelled.
    #[inline]
    pub const fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no live event is pending.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Events dispatched since the queue was created.
    pub const fn total_dispatched(&self) -> u64 {
        self.total_dispatched
    }

    /// Starts recording every dispatched event.
    pub fn enable_trace(&mut self) {
        if self.trace.is_none() {
            self.trace = Some(Vec::new());
        }
    }

    /// Recorded dispatch trace, if tracing is enabled.
    pub fn trace(&self) -> Option<&[TraceRecord]> {
        self.trace.as_deref()
    }

    /// Schedules an event `delta` cycles from now.
    ///
    /// A delay of zero is promoted to one cycle.
    ///
    /// # Errors
    ///
    /// Returns `EventError::NegativeDelay` if `delta < 0`.
    pub fn schedule(&mut self, delta: i64, event: E) -> Result<EventHandle, EventError> {
        let delay = Cycle::try_from(delta).map_err(|_| EventError::NegativeDelay { delta })?;
        Ok(self.schedule_after(delay, event))
    }

    /// Schedules an event `delay` cycles from now (at least one).
    pub fn schedule_after(&mut self, delay: Cycle, event: E) -> EventHandle {
        let cycle = self.now.saturating_add(delay.max(1));
        self.insert(cycle, event)
    }

    /// Schedules an event at an absolute future cycle.
    ///
    /// # Errors
    ///
    /// Returns `EventError::NotInFuture` if `cycle <= now`.
    pub fn schedule_at(&mut self, cycle: Cycle, event: E) -> Result<EventHandle, EventError> {
        if cycle <= self.now {
            return Err(EventError::NotInFuture {
                cycle,
                now: self.now,
            });
        }
        Ok(self.insert(cycle, event))
    }

    fn insert(&mut self, cycle: Cycle, event: E) -> EventHandle {
        let handle = EventHandle {
            cycle,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let _ = self.events.insert(
            handle,
            Slot {
                event,
                cancelled: false,
            },
        );
        self.live += 1;
        if self.live > self.overload_threshold && !self.overload_warned {
            self.overload_warned = true;
            warn!(
                cycle = self.now,
                pending = self.live,
                "event queue overloaded; simulation may be slow or looping"
            );
        }
        handle
    }

    /// Tombstones a pending event.
    ///
    /// # Returns
    ///
    /// True if the event was pending and is now cancelled; false if it already fired,
    /// was already cancelled, or never existed.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        match self.events.get_mut(&handle) {
            Some(slot) if !slot.cancelled => {
                slot.cancelled = true;
                self.live -= 1;
                true
            }
            _ => false,
        }
    }

    /// Returns true if the handle refers to a pending, non-cancelled event.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.events.get(&handle).is_some_and(|s| !s.cancelled)
    }

    /// Cycle of the next live event.
    pub fn next_cycle(&self) -> Option<Cycle> {
        self.events
            .iter()
            .find(|(_, s)| !s.cancelled)
            .map(|(h, _)| h.cycle)
    }

    /// Moves the clock of an empty queue, used when restoring a checkpoint.
    ///
    /// # Errors
    ///
    /// Fails if events are pending or the cycle lies in the past.
    pub fn set_now(&mut self, cycle: Cycle) -> Result<(), EventError> {
        if !self.events.is_empty() || cycle < self.now {
            return Err(EventError::NotInFuture {
                cycle,
                now: self.now,
            });
        }
        self.now = cycle;
        self.cycle_dispatched = 0;
        Ok(())
    }

    /// Dispatches events in `(cycle, sequence)` order until none remain or the next one
    /// lies beyond `limit`.
    ///
    /// # Arguments
    ///
    /// * `handler` - Receiver of every event.
    /// * `limit` - Last cycle that may be dispatched, if any.
    ///
    /// # Errors
    ///
    /// Returns the first handler error, or `EventError::SameCycleOverflow` when a cycle
    /// dispatches more events than allowed.
    pub fn run<H>(&mut self, handler: &mut H, limit: Option<Cycle>) -> Result<RunSummary, SimError>
    where
        H: EventHandler<Event = E>,
        E: fmt::Debug,
    {
        let mut dispatched = 0;
        let mut cancelled = 0;
        loop {
            let Some((&handle, _)) = self.events.first_key_value() else {
                return Ok(RunSummary {
                    finish: FinishReason::Drained,
                    cycle: self.now,
                    dispatched,
                    cancelled,
                });
            };
            if let Some(limit) = limit.filter(|&l| handle.cycle > l) {
                self.now = self.now.max(limit);
                return Ok(RunSummary {
                    finish: FinishReason::CycleLimit,
                    cycle: self.now,
                    dispatched,
                    cancelled,
                });
            }
            let Some((handle, slot)) = self.events.pop_first() else {
                continue;
            };
            if slot.cancelled {
                cancelled += 1;
                continue;
            }
            self.live -= 1;

            debug_assert!(handle.cycle >= self.now, "event queue went back in time");
            if handle.cycle > self.now {
                self.now = handle.cycle;
                self.cycle_dispatched = 0;
            }
            self.cycle_dispatched += 1;
            if self.cycle_dispatched > self.max_events_per_cycle {
                error!(
                    cycle = self.now,
                    limit = self.max_events_per_cycle,
                    pending = %self.dump(16),
                    "same-cycle event bound exceeded"
                );
                return Err(EventError::SameCycleOverflow {
                    cycle: self.now,
                    limit: self.max_events_per_cycle,
                }
                .into());
            }

            if let Some(trace) = &mut self.trace {
                trace.push(TraceRecord {
                    cycle: handle.cycle,
                    seq: handle.seq,
                    event: format!("{:?}", slot.event),
                });
            }
            dispatched += 1;
            self.total_dispatched += 1;
            handler.handle(slot.event, self)?;
        }
    }

    /// Renders up to `max` pending events for diagnostics.
    pub fn dump(&self, max: usize) -> String
    where
        E: fmt::Debug,
    {
        let mut out = format!("{} pending at cycle {}:", self.live, self.now);
        for (handle, slot) in self.events.iter().filter(|(_, s)| !s.cancelled).take(max) {
            let _ = write!(
                out,
                "\n  +{} #{} {:?}",
                handle.cycle - self.now,
                handle.seq,
                slot.event
            );
        }
        if self.live > max {
            let _ = write!(out, "\n  ... {} more", self.live - max);
        }
        out
    }
}
