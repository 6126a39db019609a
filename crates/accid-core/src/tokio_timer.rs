//! A [`TimerService`] backed by tokio tasks.
//!
//! Each armed timer is a `spawn_local` task that sleeps for the delay and
//! then runs the callback, so the service must be used from within a
//! [`tokio::task::LocalSet`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use slotmap::SlotMap;
use tokio::task::JoinHandle;

use crate::error::{Result, TimerError};
use crate::service::TimerService;
use crate::timer::{TimerCallback, TimerId};

type TaskTable = SlotMap<TimerId, Option<JoinHandle<()>>>;

/// Timer service running one-shot timers as tokio local tasks.
pub struct TokioTimerService {
    tasks: Rc<RefCell<TaskTable>>,
    closed: Cell<bool>,
}

impl TokioTimerService {
    /// Create a new service. Timers are spawned on the current `LocalSet`.
    pub fn new() -> Self {
        Self {
            tasks: Rc::new(RefCell::new(SlotMap::with_key())),
            closed: Cell::new(false),
        }
    }

    /// Refuse any further timers. Armed timers keep running.
    pub fn close(&self) {
        if !self.closed.replace(true) {
            crate::accid_debug!(armed = self.active_count(), "tokio timer service closed");
        }
    }

    /// Get the number of armed timers.
    pub fn active_count(&self) -> usize {
        self.tasks.borrow().len()
    }
}

impl Default for TokioTimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for TokioTimerService {
    fn schedule_one_shot(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId> {
        if self.closed.get() {
            return Err(TimerError::ServiceUnavailable.into());
        }

        // The deadline is fixed now, not when the task is first polled.
        let deadline = tokio::time::Instant::now() + delay;
        let id = self.tasks.borrow_mut().insert(None);
        let tasks = Rc::downgrade(&self.tasks);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep_until(deadline).await;
            // A timer cancelled after the sleep completed is no longer in
            // the table and must not run.
            let armed = tasks
                .upgrade()
                .is_some_and(|tasks| tasks.borrow_mut().remove(id).is_some());
            if armed {
                tracing::trace!(target: "accid_core::timer", ?id, "tokio timer fired");
                callback();
            }
        });

        if let Some(slot) = self.tasks.borrow_mut().get_mut(id) {
            *slot = Some(handle);
        }
        tracing::trace!(target: "accid_core::timer", ?id, ?delay, "tokio timer armed");
        Ok(id)
    }

    fn cancel(&self, id: TimerId) -> Result<()> {
        match self.tasks.borrow_mut().remove(id) {
            Some(handle) => {
                if let Some(handle) = handle {
                    handle.abort();
                }
                tracing::trace!(target: "accid_core::timer", ?id, "tokio timer cancelled");
                Ok(())
            }
            None => Err(TimerError::InvalidTimerId.into()),
        }
    }

    fn is_armed(&self, id: TimerId) -> bool {
        self.tasks.borrow().contains_key(id)
    }
}

impl Drop for TokioTimerService {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.borrow_mut().drain() {
            if let Some(handle) = handle {
                handle.abort();
            }
        }
    }
}
