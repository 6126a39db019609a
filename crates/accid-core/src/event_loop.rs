//! Cooperative single-threaded event loop.
//!
//! The loop owns a [`TimerQueue`] and dispatches due timer callbacks on the
//! thread that created it. Other threads talk to it through an
//! [`EventLoopProxy`].
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use accid_core::{EventLoop, TimerService};
//!
//! let event_loop = EventLoop::with_manual_clock();
//! let fired = Rc::new(Cell::new(false));
//! let flag = fired.clone();
//!
//! event_loop
//!     .schedule_one_shot(Duration::from_millis(500), Box::new(move || flag.set(true)))
//!     .unwrap();
//!
//! event_loop.advance(Duration::from_millis(499));
//! assert!(!fired.get());
//! event_loop.advance(Duration::from_millis(1));
//! assert!(fired.get());
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{CoreError, Result, TimerError};
use crate::event::LoopEvent;
use crate::service::TimerService;
use crate::timer::{TimerCallback, TimerId, TimerQueue};

struct EventLoopInner {
    timers: RefCell<TimerQueue>,
    sender: Sender<LoopEvent>,
    receiver: Receiver<LoopEvent>,
    should_quit: Cell<bool>,
    /// Set when the loop runs on a manual clock.
    manual_now: Cell<Option<Instant>>,
}

/// A single-threaded event loop servicing one-shot timers.
///
/// `EventLoop` is a cheap handle; clones share the same loop. It is not
/// `Send`: timers are armed and fired on the owner thread only.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<EventLoopInner>,
}

impl EventLoop {
    /// Create an event loop driven by the real clock.
    pub fn new() -> Self {
        Self::with_clock(None)
    }

    /// Create an event loop whose clock only moves through
    /// [`advance`](Self::advance) or while [`run_until_idle`](Self::run_until_idle)
    /// waits for a deadline.
    pub fn with_manual_clock() -> Self {
        Self::with_clock(Some(Instant::now()))
    }

    fn with_clock(manual_now: Option<Instant>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            inner: Rc::new(EventLoopInner {
                timers: RefCell::new(TimerQueue::new()),
                sender,
                receiver,
                should_quit: Cell::new(false),
                manual_now: Cell::new(manual_now),
            }),
        }
    }

    /// The loop's current time.
    pub fn now(&self) -> Instant {
        self.inner.manual_now.get().unwrap_or_else(Instant::now)
    }

    /// Check whether the loop runs on a manual clock.
    pub fn is_manual_clock(&self) -> bool {
        self.inner.manual_now.get().is_some()
    }

    /// Let `duration` elapse, then run every timer that became due.
    ///
    /// On a manual clock this moves the clock forward; on the real clock it
    /// sleeps the current thread.
    ///
    /// Returns the number of callbacks that ran.
    pub fn advance(&self, duration: Duration) -> usize {
        match self.inner.manual_now.get() {
            Some(now) => self.inner.manual_now.set(Some(now + duration)),
            None => std::thread::sleep(duration),
        }
        self.process_events();
        self.process_ready()
    }

    /// Get a proxy for posting events from other threads.
    pub fn proxy(&self) -> EventLoopProxy {
        EventLoopProxy {
            sender: self.inner.sender.clone(),
        }
    }

    /// Stop the loop.
    ///
    /// Pending timers are no longer serviced and new timers are refused with
    /// [`TimerError::ServiceUnavailable`]. Cancellation keeps working.
    pub fn quit(&self) {
        if !self.inner.should_quit.replace(true) {
            tracing::info!(target: "accid_core::event_loop", "quit requested");
        }
    }

    /// Check whether [`quit`](Self::quit) has been requested.
    pub fn should_quit(&self) -> bool {
        self.inner.should_quit.get()
    }

    /// Run every timer that is due now.
    ///
    /// Returns the number of callbacks that ran.
    pub fn process_ready(&self) -> usize {
        self.process_ready_at(self.now())
    }

    /// Run every timer that is due at `now`.
    ///
    /// Callbacks run one at a time with no internal borrow held, so they may
    /// arm or cancel timers on this loop.
    pub fn process_ready_at(&self, now: Instant) -> usize {
        if self.should_quit() {
            return 0;
        }

        let mut count = 0;
        loop {
            let next = self.inner.timers.borrow_mut().take_next_expired_at(now);
            let Some((id, callback)) = next else {
                break;
            };
            tracing::trace!(target: "accid_core::event_loop", ?id, "dispatching timer");
            callback();
            count += 1;
        }

        if count > 0 {
            tracing::trace!(target: "accid_core::event_loop", count, "processed timers");
        }
        count
    }

    /// Drain events posted through proxies.
    ///
    /// Returns `true` if at least one event was handled.
    pub fn process_events(&self) -> bool {
        let mut handled = false;
        loop {
            match self.inner.receiver.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Duration until the next timer is due.
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.now();
        self.inner.timers.borrow_mut().time_until_next_at(now)
    }

    /// Get the number of armed timers.
    pub fn active_timer_count(&self) -> usize {
        self.inner.timers.borrow().active_count()
    }

    /// Run until no timers remain armed or the loop is asked to quit.
    ///
    /// Returns the number of callbacks that ran.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            self.process_events();
            if self.should_quit() {
                break;
            }
            total += self.process_ready();
            match self.time_until_next() {
                Some(wait) => self.wait(Some(wait)),
                None => break,
            }
        }
        total
    }

    /// Run for `duration` of loop time, servicing timers as they become due.
    ///
    /// Returns the number of callbacks that ran.
    pub fn run_for(&self, duration: Duration) -> usize {
        let deadline = self.now() + duration;
        let mut total = 0;
        loop {
            self.process_events();
            if self.should_quit() {
                break;
            }
            total += self.process_ready();

            let now = self.now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let wait = self
                .time_until_next()
                .map_or(remaining, |next| next.min(remaining));
            self.wait(Some(wait));
        }
        total
    }

    /// Run until a [`LoopEvent::Quit`] arrives or [`quit`](Self::quit) is
    /// called from a timer callback.
    #[tracing::instrument(skip(self), target = "accid_core::event_loop", level = "debug")]
    pub fn run(&self) -> Result<()> {
        if self.should_quit() {
            return Err(CoreError::EventLoopExited);
        }
        tracing::info!(target: "accid_core::event_loop", "starting event loop");

        loop {
            self.process_events();
            if self.should_quit() {
                break;
            }
            self.process_ready();
            if self.should_quit() {
                break;
            }
            let wait = self.time_until_next();
            self.wait(wait);
        }

        tracing::info!(target: "accid_core::event_loop", "event loop exited");
        Ok(())
    }

    /// Block until an event arrives or `timeout` elapses.
    fn wait(&self, timeout: Option<Duration>) {
        match (timeout, self.inner.manual_now.get()) {
            (Some(timeout), Some(now)) => self.inner.manual_now.set(Some(now + timeout)),
            (Some(timeout), None) => {
                if let Ok(event) = self.inner.receiver.recv_timeout(timeout) {
                    self.handle_event(event);
                }
            }
            (None, _) => {
                if let Ok(event) = self.inner.receiver.recv() {
                    self.handle_event(event);
                }
            }
        }
    }

    fn handle_event(&self, event: LoopEvent) {
        tracing::trace!(target: "accid_core::event_loop", ?event, "received loop event");
        match event {
            LoopEvent::Quit => self.quit(),
            LoopEvent::WakeUp => {}
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for EventLoop {
    fn schedule_one_shot(&self, delay: Duration, callback: TimerCallback) -> Result<TimerId> {
        if self.should_quit() {
            return Err(TimerError::ServiceUnavailable.into());
        }
        let now = self.now();
        Ok(self
            .inner
            .timers
            .borrow_mut()
            .start_one_shot_at(now, delay, callback))
    }

    fn cancel(&self, id: TimerId) -> Result<()> {
        self.inner.timers.borrow_mut().cancel(id)
    }

    fn is_armed(&self, id: TimerId) -> bool {
        self.inner.timers.borrow().is_active(id)
    }
}

/// A `Send` handle for posting [`LoopEvent`]s into an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopProxy {
    sender: Sender<LoopEvent>,
}

impl EventLoopProxy {
    /// Post an event to the loop.
    pub fn send_event(&self, event: LoopEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| CoreError::EventDispatchFailed)
    }

    /// Ask the loop to quit.
    pub fn quit(&self) -> Result<()> {
        self.send_event(LoopEvent::Quit)
    }

    /// Wake the loop so it re-evaluates its timers.
    pub fn wake_up(&self) -> Result<()> {
        self.send_event(LoopEvent::WakeUp)
    }
}

static_assertions::assert_impl_all!(EventLoopProxy: Send, Sync);
static_assertions::assert_not_impl_any!(EventLoop: Send, Sync);

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    fn counter() -> (Rc<Cell<usize>>, impl Fn() -> TimerCallback) {
        let count = Rc::new(Cell::new(0));
        let make = {
            let count = count.clone();
            move || -> TimerCallback {
                let count = count.clone();
                Box::new(move || count.set(count.get() + 1))
            }
        };
        (count, make)
    }

    #[test]
    fn test_manual_clock_fires_at_deadline() {
        let event_loop = EventLoop::with_manual_clock();
        let (count, make) = counter();

        let id = event_loop
            .schedule_one_shot(Duration::from_millis(100), make())
            .unwrap();
        assert!(event_loop.is_armed(id));

        assert_eq!(event_loop.advance(Duration::from_millis(99)), 0);
        assert_eq!(count.get(), 0);
        assert_eq!(event_loop.advance(Duration::from_millis(1)), 1);
        assert_eq!(count.get(), 1);
        assert!(!event_loop.is_armed(id));
    }

    #[test]
    fn test_cancelled_timer_never_runs() {
        let event_loop = EventLoop::with_manual_clock();
        let (count, make) = counter();

        let id = event_loop
            .schedule_one_shot(Duration::from_millis(10), make())
            .unwrap();
        event_loop.cancel(id).unwrap();

        event_loop.advance(Duration::from_secs(1));
        assert_eq!(count.get(), 0);
        assert!(event_loop.cancel(id).is_err());
    }

    #[test]
    fn test_callback_may_cancel_other_due_timer() {
        let event_loop = EventLoop::with_manual_clock();
        let (count, make) = counter();

        let victim = Rc::new(Cell::new(None));
        let canceller = {
            let event_loop = event_loop.clone();
            let victim = victim.clone();
            Box::new(move || {
                if let Some(id) = victim.get() {
                    event_loop.cancel(id).unwrap();
                }
            })
        };

        event_loop
            .schedule_one_shot(Duration::from_millis(10), canceller)
            .unwrap();
        let id = event_loop
            .schedule_one_shot(Duration::from_millis(10), make())
            .unwrap();
        victim.set(Some(id));

        assert_eq!(event_loop.advance(Duration::from_millis(10)), 1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_callback_may_arm_timer() {
        let event_loop = EventLoop::with_manual_clock();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = {
            let event_loop = event_loop.clone();
            let log = log.clone();
            Box::new(move || {
                log.borrow_mut().push("first");
                let log = log.clone();
                event_loop
                    .schedule_one_shot(
                        Duration::from_millis(50),
                        Box::new(move || log.borrow_mut().push("second")),
                    )
                    .unwrap();
            })
        };
        event_loop
            .schedule_one_shot(Duration::from_millis(50), first)
            .unwrap();

        assert_eq!(event_loop.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(event_loop.active_timer_count(), 0);
    }

    #[test]
    fn test_quit_refuses_new_timers() {
        let event_loop = EventLoop::with_manual_clock();
        let (count, make) = counter();

        let id = event_loop
            .schedule_one_shot(Duration::from_millis(10), make())
            .unwrap();
        event_loop.quit();

        let err = event_loop
            .schedule_one_shot(Duration::from_millis(10), make())
            .unwrap_err();
        assert_eq!(err, CoreError::Timer(TimerError::ServiceUnavailable));

        // Armed timers are not serviced after quit but can still be cancelled.
        assert_eq!(event_loop.advance(Duration::from_secs(1)), 0);
        assert_eq!(count.get(), 0);
        event_loop.cancel(id).unwrap();

        assert_eq!(event_loop.run(), Err(CoreError::EventLoopExited));
    }

    #[test]
    fn test_proxy_quit_from_other_thread() {
        let event_loop = EventLoop::new();
        let proxy = event_loop.proxy();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            proxy.quit().unwrap();
        });

        event_loop.run().unwrap();
        handle.join().unwrap();
        assert!(event_loop.should_quit());
    }

    #[test]
    fn test_run_for_real_clock() {
        let event_loop = EventLoop::new();
        let (count, make) = counter();

        event_loop
            .schedule_one_shot(Duration::from_millis(5), make())
            .unwrap();
        event_loop
            .schedule_one_shot(Duration::from_secs(60), make())
            .unwrap();

        assert_eq!(event_loop.run_for(Duration::from_millis(50)), 1);
        assert_eq!(count.get(), 1);
        assert_eq!(event_loop.active_timer_count(), 1);
    }

    #[test]
    fn test_proxy_fails_after_loop_dropped() {
        let proxy = EventLoop::new().proxy();
        // The loop's own sender is gone, and so is its receiver.
        assert_eq!(proxy.wake_up(), Err(CoreError::EventDispatchFailed));
    }
}
