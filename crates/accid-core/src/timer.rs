//! One-shot timer queue.
//!
//! Timers carry a callback that is handed back to the owning event loop once
//! the deadline has passed. The queue never runs callbacks itself, so a
//! callback is free to start or cancel other timers on the same queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, TimerError};

new_key_type! {
    /// A unique identifier for a timer.
    pub struct TimerId;
}

/// A boxed timer callback. Runs on the owner thread, at most once.
pub type TimerCallback = Box<dyn FnOnce() + 'static>;

/// Internal timer data.
struct TimerData {
    /// When this timer should fire.
    deadline: Instant,
    /// The callback to run when the timer fires.
    callback: TimerCallback,
}

/// An entry in the timer queue (min-heap by fire time, FIFO on ties).
#[derive(Debug, Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
    sequence: u64,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.sequence == other.sequence
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Manages pending one-shot timers.
pub struct TimerQueue {
    /// All armed timers.
    timers: SlotMap<TimerId, TimerData>,
    /// Priority queue of pending fires. Entries for cancelled timers are
    /// skipped lazily.
    queue: BinaryHeap<TimerQueueEntry>,
    /// Insertion counter used to keep equal deadlines in FIFO order.
    next_sequence: u64,
}

impl TimerQueue {
    /// Create an empty timer queue.
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Start a one-shot timer that fires `delay` from now.
    pub fn start_one_shot(&mut self, delay: Duration, callback: TimerCallback) -> TimerId {
        self.start_one_shot_at(Instant::now(), delay, callback)
    }

    /// Start a one-shot timer that fires `delay` after `now`.
    pub fn start_one_shot_at(
        &mut self,
        now: Instant,
        delay: Duration,
        callback: TimerCallback,
    ) -> TimerId {
        let deadline = now + delay;
        let id = self.timers.insert(TimerData { deadline, callback });

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(TimerQueueEntry {
            id,
            fire_time: deadline,
            sequence,
        });

        tracing::trace!(target: "accid_core::timer", ?id, ?delay, "timer armed");
        id
    }

    /// Cancel a pending timer. Its callback is dropped without running.
    pub fn cancel(&mut self, id: TimerId) -> Result<()> {
        if self.timers.remove(id).is_some() {
            tracing::trace!(target: "accid_core::timer", ?id, "timer cancelled");
            Ok(())
        } else {
            Err(TimerError::InvalidTimerId.into())
        }
    }

    /// Check if a timer is still pending.
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// The deadline of a pending timer.
    pub fn deadline(&self, id: TimerId) -> Option<Instant> {
        self.timers.get(id).map(|t| t.deadline)
    }

    /// Duration from `now` until the next timer fires.
    ///
    /// Returns `None` if no timers are pending.
    pub fn time_until_next_at(&mut self, now: Instant) -> Option<Duration> {
        self.discard_cancelled();
        self.queue
            .peek()
            .map(|entry| entry.fire_time.saturating_duration_since(now))
    }

    /// Remove every timer whose deadline is at or before `now`.
    ///
    /// Returns the fired timers with their callbacks, earliest first. The
    /// caller is responsible for invoking the callbacks.
    #[tracing::instrument(skip(self), target = "accid_core::timer", level = "trace")]
    pub fn take_expired_at(&mut self, now: Instant) -> Vec<(TimerId, TimerCallback)> {
        let mut fired = Vec::new();
        while let Some(timer) = self.take_next_expired_at(now) {
            fired.push(timer);
        }
        fired
    }

    /// Remove the earliest timer whose deadline is at or before `now`.
    ///
    /// Event loops use this to run one callback at a time, so a callback
    /// that cancels another due timer still prevents it from firing.
    pub fn take_next_expired_at(&mut self, now: Instant) -> Option<(TimerId, TimerCallback)> {
        while let Some(entry) = self.queue.peek().copied() {
            if entry.fire_time > now {
                return None;
            }
            self.queue.pop();

            // Cancelled timers leave their heap entry behind.
            let Some(data) = self.timers.remove(entry.id) else {
                continue;
            };

            tracing::trace!(target: "accid_core::timer", id = ?entry.id, "timer fired");
            return Some((entry.id, data.callback));
        }
        None
    }

    /// Get the number of pending timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Check whether no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    fn discard_cancelled(&mut self) {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}
