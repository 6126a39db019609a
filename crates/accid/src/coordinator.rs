//! Deferred identifier reclamation.
//!
//! Platform clients cache identifiers and may deliver events that reference
//! them well after the owning node is gone. Releasing an id therefore only
//! queues it; the queue is flushed back into the allocator once the release
//! delay has passed, so a stale event can never be mistaken for one about a
//! new node that reused the id.
//!
//! ```text
//!            request_release             timer fires / flush_pending
//!   Idle ───────────────────────▶ Pending ─────────────────────────────▶ Idle
//!                                  │  ▲
//!                                  └──┘ request_release (same deadline)
//! ```
//!
//! Once the subsystem is shut down, requests bypass the queue and release
//! synchronously.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::{Rc, Weak};
use std::time::Duration;

use accid_core::{PerfSpan, TimerId, TimerService};

use crate::allocator::IdAllocator;
use crate::id::PlatformId;
use crate::shutdown::ShutdownSignal;

/// The allocator shared by the coordinator and every platform wrapper.
pub type SharedAllocator = Rc<RefCell<IdAllocator>>;

/// Observable state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseState {
    /// Nothing queued.
    Idle,
    /// At least one id is waiting for the flush.
    Pending,
}

#[derive(Default)]
struct PendingReleases {
    /// Ids in request order.
    queue: Vec<PlatformId>,
    /// Membership index over `queue`.
    queued: HashSet<PlatformId>,
    /// The armed flush timer, if any.
    timer: Option<TimerId>,
}

/// Decouples logical release of an identifier from its reclamation.
pub struct DeferredReleaseCoordinator {
    allocator: SharedAllocator,
    timers: Rc<dyn TimerService>,
    shutdown: ShutdownSignal,
    delay: Duration,
    pending: RefCell<PendingReleases>,
    this: Weak<Self>,
}

impl DeferredReleaseCoordinator {
    /// Create a coordinator releasing into `allocator` after `delay`.
    pub fn new(
        allocator: SharedAllocator,
        timers: Rc<dyn TimerService>,
        shutdown: ShutdownSignal,
        delay: Duration,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            allocator,
            timers,
            shutdown,
            delay,
            pending: RefCell::new(PendingReleases::default()),
            this: this.clone(),
        })
    }

    /// Ask for `id` to be returned to the allocator.
    ///
    /// If the subsystem is shut down the id is released before this returns.
    /// Otherwise it is queued and a flush timer is armed unless one already
    /// is; an armed timer keeps its original deadline.
    ///
    /// A request for an id that is already queued is ignored.
    pub fn request_release(&self, id: PlatformId) {
        if self.pending.borrow().queued.contains(&id) {
            tracing::warn!(
                target: "accid::coordinator",
                ?id,
                "identifier already pending release; ignoring duplicate request"
            );
            return;
        }

        if self.shutdown.is_set() {
            tracing::debug!(target: "accid::coordinator", ?id, "shut down; releasing immediately");
            self.allocator.borrow_mut().release(id);
            return;
        }

        let needs_timer = {
            let mut pending = self.pending.borrow_mut();
            pending.queued.insert(id);
            pending.queue.push(id);
            pending.timer.is_none()
        };
        tracing::trace!(target: "accid::coordinator", ?id, "queued for release");

        if needs_timer {
            self.arm_timer();
        }
    }

    fn arm_timer(&self) {
        // The callback learns its own id once scheduling returns; timers
        // never fire synchronously from `schedule_one_shot`.
        let timer_slot = Rc::new(Cell::new(None));
        let callback = {
            let this = self.this.clone();
            let timer_slot = timer_slot.clone();
            Box::new(move || {
                if let (Some(this), Some(timer)) = (this.upgrade(), timer_slot.get()) {
                    this.on_timer_fired(timer);
                }
            })
        };

        match self.timers.schedule_one_shot(self.delay, callback) {
            Ok(timer) => {
                timer_slot.set(Some(timer));
                self.pending.borrow_mut().timer = Some(timer);
                tracing::debug!(
                    target: "accid::coordinator",
                    ?timer,
                    delay = ?self.delay,
                    "release timer armed"
                );
            }
            Err(err) => {
                tracing::debug!(
                    target: "accid::coordinator",
                    %err,
                    "timer service unavailable; releasing immediately"
                );
                self.flush_pending();
            }
        }
    }

    /// Timer callback. Flushes the queue if `timer` is the armed timer.
    pub fn on_timer_fired(&self, timer: TimerId) {
        {
            let mut pending = self.pending.borrow_mut();
            if pending.timer != Some(timer) {
                tracing::trace!(target: "accid::coordinator", ?timer, "ignoring stale release timer");
                return;
            }
            pending.timer = None;
        }
        tracing::trace!(target: "accid::coordinator", ?timer, "release timer fired");
        self.drain();
    }

    /// Release every queued id, in request order, and disarm the timer.
    ///
    /// Does nothing when the queue is empty. Returns the number of ids
    /// released.
    pub fn flush_pending(&self) -> usize {
        if let Some(timer) = self.pending.borrow_mut().timer.take() {
            self.cancel_armed(timer);
        }
        self.drain()
    }

    #[tracing::instrument(skip(self), target = "accid::coordinator", level = "debug")]
    fn drain(&self) -> usize {
        let ids = {
            let mut pending = self.pending.borrow_mut();
            pending.queued.clear();
            std::mem::take(&mut pending.queue)
        };
        if ids.is_empty() {
            return 0;
        }

        let mut allocator = self.allocator.borrow_mut();
        for &id in &ids {
            allocator.release(id);
        }
        tracing::debug!(target: "accid::coordinator", count = ids.len(), "flushed pending releases");
        ids.len()
    }

    /// Cancel the armed timer without releasing anything.
    ///
    /// Queued ids stay unreclaimed until the next flush; a later request
    /// arms a fresh timer. Returns `true` if a timer was armed.
    pub fn cancel_timer(&self) -> bool {
        let timer = self.pending.borrow_mut().timer.take();
        match timer {
            Some(timer) => {
                self.cancel_armed(timer);
                true
            }
            None => false,
        }
    }

    fn cancel_armed(&self, timer: TimerId) {
        if let Err(err) = self.timers.cancel(timer) {
            tracing::trace!(target: "accid::coordinator", ?timer, %err, "release timer already gone");
        }
    }

    /// Teardown hook: cancel the timer and release everything queued.
    ///
    /// Returns the number of ids released.
    pub fn finalize(&self) -> usize {
        let _span = PerfSpan::new("finalize_release_queue");
        let released = self.flush_pending();
        tracing::debug!(target: "accid::coordinator", released, "release coordinator finalized");
        released
    }

    /// Current state.
    pub fn state(&self) -> ReleaseState {
        if self.pending.borrow().queue.is_empty() {
            ReleaseState::Idle
        } else {
            ReleaseState::Pending
        }
    }

    /// Queued ids, in request order.
    pub fn pending_ids(&self) -> Vec<PlatformId> {
        self.pending.borrow().queue.clone()
    }

    /// Number of queued ids.
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().queue.len()
    }

    /// Check whether `id` is queued.
    pub fn is_pending(&self, id: PlatformId) -> bool {
        self.pending.borrow().queued.contains(&id)
    }

    /// The armed flush timer.
    pub fn armed_timer(&self) -> Option<TimerId> {
        self.pending.borrow().timer
    }

    /// The configured release delay.
    pub fn release_delay(&self) -> Duration {
        self.delay
    }
}

impl Drop for DeferredReleaseCoordinator {
    fn drop(&mut self) {
        let pending = self.pending.get_mut();
        if let Some(timer) = pending.timer.take() {
            let _ = self.timers.cancel(timer);
        }
        if !pending.queue.is_empty() {
            tracing::debug!(
                target: "accid::coordinator",
                leaked = pending.queue.len(),
                "coordinator dropped with unreclaimed identifiers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use accid_core::EventLoop;

    use super::*;
    use crate::id::{DEFAULT_ID_BITS, RawIndex};

    const DELAY: Duration = Duration::from_millis(1000);

    struct Fixture {
        event_loop: EventLoop,
        allocator: SharedAllocator,
        shutdown: ShutdownSignal,
        coordinator: Rc<DeferredReleaseCoordinator>,
    }

    fn fixture() -> Fixture {
        let event_loop = EventLoop::with_manual_clock();
        let allocator = Rc::new(RefCell::new(IdAllocator::new(DEFAULT_ID_BITS)));
        let shutdown = ShutdownSignal::new();
        let coordinator = DeferredReleaseCoordinator::new(
            allocator.clone(),
            Rc::new(event_loop.clone()),
            shutdown.clone(),
            DELAY,
        );
        Fixture {
            event_loop,
            allocator,
            shutdown,
            coordinator,
        }
    }

    impl Fixture {
        fn allocate(&self) -> PlatformId {
            self.allocator.borrow_mut().allocate()
        }

        fn is_allocated(&self, id: PlatformId) -> bool {
            self.allocator.borrow().is_live(id)
        }
    }

    #[test]
    fn test_release_waits_for_delay() {
        let f = fixture();
        let ids: Vec<_> = (0..3).map(|_| f.allocate()).collect();

        f.coordinator.request_release(ids[0]);
        f.coordinator.request_release(ids[1]);
        assert_eq!(f.coordinator.state(), ReleaseState::Pending);
        assert_eq!(f.coordinator.pending_ids(), vec![ids[0], ids[1]]);
        assert!(f.is_allocated(ids[0]));

        f.event_loop.advance(DELAY - Duration::from_millis(1));
        assert!(f.is_allocated(ids[0]));

        f.event_loop.advance(Duration::from_millis(1));
        assert!(!f.is_allocated(ids[0]));
        assert!(!f.is_allocated(ids[1]));
        assert!(f.is_allocated(ids[2]));
        assert_eq!(f.coordinator.state(), ReleaseState::Idle);
        assert_eq!(f.coordinator.armed_timer(), None);
    }

    #[test]
    fn test_later_requests_share_original_deadline() {
        let f = fixture();
        let a = f.allocate();
        let b = f.allocate();

        f.coordinator.request_release(a);
        let timer = f.coordinator.armed_timer().unwrap();

        f.event_loop.advance(Duration::from_millis(600));
        f.coordinator.request_release(b);
        assert_eq!(f.coordinator.armed_timer(), Some(timer));
        assert_eq!(f.event_loop.active_timer_count(), 1);

        // The deadline is not extended by the second request.
        f.event_loop.advance(Duration::from_millis(400));
        assert!(!f.is_allocated(a));
        assert!(!f.is_allocated(b));
    }

    #[test]
    fn test_no_reuse_before_deadline() {
        let f = fixture();
        let id = f.allocate();
        f.coordinator.request_release(id);

        let next = f.allocate();
        assert_ne!(next, id);
        assert_eq!(next.raw(), RawIndex::new(1));

        f.event_loop.advance(DELAY);
        assert_eq!(f.allocate(), id);
    }

    #[test]
    fn test_shutdown_releases_immediately() {
        let f = fixture();
        let id = f.allocate();
        f.shutdown.mark();

        f.coordinator.request_release(id);
        assert!(!f.is_allocated(id));
        assert_eq!(f.coordinator.state(), ReleaseState::Idle);
        assert_eq!(f.event_loop.active_timer_count(), 0);
        assert_eq!(f.allocate(), id);
    }

    #[test]
    fn test_flush_empty_is_noop() {
        let f = fixture();
        assert_eq!(f.coordinator.flush_pending(), 0);
        assert_eq!(f.coordinator.flush_pending(), 0);
        assert_eq!(f.coordinator.state(), ReleaseState::Idle);
        assert_eq!(f.allocator.borrow().live_count(), 0);
    }

    #[test]
    fn test_duplicate_request_is_ignored() {
        let f = fixture();
        let id = f.allocate();

        f.coordinator.request_release(id);
        f.coordinator.request_release(id);
        assert_eq!(f.coordinator.pending_count(), 1);

        // A double release would panic in the allocator.
        f.event_loop.advance(DELAY);
        assert!(!f.is_allocated(id));
    }

    #[test]
    fn test_duplicate_request_after_shutdown_is_ignored() {
        let f = fixture();
        let id = f.allocate();
        f.coordinator.request_release(id);
        f.shutdown.mark();
        f.coordinator.request_release(id);

        assert!(f.is_allocated(id));
        assert_eq!(f.coordinator.finalize(), 1);
        assert!(!f.is_allocated(id));
    }

    #[test]
    fn test_finalize_cancels_timer_and_flushes() {
        let f = fixture();
        let ids: Vec<_> = (0..4).map(|_| f.allocate()).collect();
        for &id in &ids {
            f.coordinator.request_release(id);
        }
        let timer = f.coordinator.armed_timer().unwrap();

        assert_eq!(f.coordinator.finalize(), 4);
        assert!(!f.event_loop.is_armed(timer));
        assert_eq!(f.allocator.borrow().live_count(), 0);

        // The cancelled timer never fires into an empty queue.
        assert_eq!(f.event_loop.advance(DELAY * 2), 0);
    }

    #[test]
    fn test_cancel_timer_keeps_queue() {
        let f = fixture();
        let a = f.allocate();
        f.coordinator.request_release(a);

        assert!(f.coordinator.cancel_timer());
        assert!(!f.coordinator.cancel_timer());
        f.event_loop.advance(DELAY * 2);
        assert!(f.is_allocated(a));
        assert_eq!(f.coordinator.state(), ReleaseState::Pending);

        // The next request arms a fresh timer that flushes both.
        let b = f.allocate();
        f.coordinator.request_release(b);
        assert!(f.coordinator.armed_timer().is_some());
        f.event_loop.advance(DELAY);
        assert!(!f.is_allocated(a));
        assert!(!f.is_allocated(b));
    }

    #[test]
    fn test_unavailable_timer_service_releases_immediately() {
        let f = fixture();
        let id = f.allocate();
        f.event_loop.quit();

        f.coordinator.request_release(id);
        assert!(!f.is_allocated(id));
        assert_eq!(f.coordinator.state(), ReleaseState::Idle);
        assert_eq!(f.coordinator.armed_timer(), None);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let f = fixture();
        let id = f.allocate();
        f.coordinator.request_release(id);
        let timer = f.coordinator.armed_timer().unwrap();

        f.coordinator.flush_pending();
        let again = f.allocate();
        f.coordinator.request_release(again);

        // A late delivery for the old timer must not flush the new queue.
        f.coordinator.on_timer_fired(timer);
        assert!(f.coordinator.is_pending(again));
        assert!(f.is_allocated(again));
    }

    #[test]
    fn test_flush_in_request_order() {
        let f = fixture();
        let ids: Vec<_> = (0..5).map(|_| f.allocate()).collect();
        for &id in ids.iter().rev() {
            f.coordinator.request_release(id);
        }
        let expected: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(f.coordinator.pending_ids(), expected);
        assert_eq!(f.coordinator.flush_pending(), 5);
    }
}
