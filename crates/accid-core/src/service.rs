//! The timer-service seam between the identifier core and its runtime.

use std::rc::Rc;
use std::time::Duration;

use crate::error::Result;
use crate::timer::{TimerCallback, TimerId};

/// A facility that runs a callback once, on the owner thread, after a delay.
///
/// Implemented by [`EventLoop`](crate::EventLoop) and, with the `tokio`
/// feature, by `TokioTimerService`. Tests may provide their own.
pub trait TimerService {
    /// Arm a one-shot timer.
    ///
    /// Fails with [`TimerError::ServiceUnavailable`](crate::TimerError) when the
    /// service is being torn down and can no longer guarantee delivery.
    fn schedule_one_shot(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId>;

    /// Cancel an armed timer. The callback is dropped without running.
    ///
    /// Cancellation is synchronous: once this returns the callback will
    /// never run.
    fn cancel(&self, id: TimerId) -> Result<()>;

    /// Check whether `id` is still armed.
    fn is_armed(&self, id: TimerId) -> bool;
}

impl<T: TimerService + ?Sized> TimerService for Rc<T> {
    fn schedule_one_shot(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId> {
        (**self).schedule_one_shot(delay, callback)
    }

    fn cancel(&self, id: TimerId) -> Result<()> {
        (**self).cancel(id)
    }

    fn is_armed(&self, id: TimerId) -> bool {
        (**self).is_armed(id)
    }
}
