//! The accessibility subsystem root object.
//!
//! [`AccessibilitySubsystem`] owns the allocator, the release coordinator
//! and the id-to-object map for one accessibility tree. It is constructed
//! explicitly and passed to whatever manages tree lifecycle; there is no
//! process-wide instance.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use accid_core::{EventLoop, TimerService};

use crate::allocator::IdAllocator;
use crate::config::IdConfig;
use crate::coordinator::{DeferredReleaseCoordinator, SharedAllocator};
use crate::error::Result;
use crate::id::PlatformId;
use crate::role::AccessibleRole;
use crate::shutdown::ShutdownSignal;
use crate::wrapper::{AccessibleNodeWrapper, PlatformAccessible, PlatformRef};

/// State shared between the subsystem and its node wrappers.
pub(crate) struct SubsystemShared {
    pub(crate) allocator: SharedAllocator,
    pub(crate) coordinator: Rc<DeferredReleaseCoordinator>,
    /// Live platform objects by id. Entries are removed at node shutdown.
    registry: RefCell<HashMap<PlatformId, Weak<PlatformAccessible>>>,
    pub(crate) live_nodes: Cell<usize>,
}

impl SubsystemShared {
    pub(crate) fn register(&self, id: PlatformId, platform: &Rc<PlatformAccessible>) {
        let previous = self
            .registry
            .borrow_mut()
            .insert(id, Rc::downgrade(platform));
        debug_assert!(previous.is_none(), "identifier {id:?} registered twice");
    }

    pub(crate) fn unregister(&self, id: PlatformId) {
        self.registry.borrow_mut().remove(&id);
    }
}

/// Point-in-time counters for a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubsystemStats {
    /// Identifiers currently allocated, pending ones included.
    pub live_ids: usize,
    /// Identifiers waiting for the deferred flush.
    pub pending_releases: usize,
    /// Nodes created and not yet shut down.
    pub live_nodes: usize,
    /// Platform objects resolvable by id.
    pub registered_wrappers: usize,
}

/// Root object of the identifier subsystem.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use accid::{AccessibilitySubsystem, AccessibleRole, IdConfig};
/// use accid_core::EventLoop;
///
/// let event_loop = EventLoop::with_manual_clock();
/// let subsystem = AccessibilitySubsystem::with_event_loop(IdConfig::default(), &event_loop)?;
///
/// let mut node = subsystem.create_node(AccessibleRole::Button, "OK");
/// let id = node.platform_wrapper()?.unique_id()?;
/// assert!(subsystem.resolve(id).is_some());
///
/// node.shutdown();
/// assert!(subsystem.resolve(id).is_none());
/// assert!(subsystem.allocator().is_live(id));
///
/// event_loop.advance(Duration::from_secs(1));
/// assert!(!subsystem.allocator().is_live(id));
/// # Ok::<(), accid::Error>(())
/// ```
pub struct AccessibilitySubsystem {
    config: IdConfig,
    shutdown: ShutdownSignal,
    shared: Rc<SubsystemShared>,
}

impl AccessibilitySubsystem {
    /// Create a subsystem that schedules its deferred flush on `timers`.
    pub fn new(config: IdConfig, timers: Rc<dyn TimerService>) -> Result<Self> {
        config.validate()?;

        let shutdown = ShutdownSignal::new();
        let allocator = Rc::new(RefCell::new(IdAllocator::new(config.id_bits)));
        let coordinator = DeferredReleaseCoordinator::new(
            allocator.clone(),
            timers,
            shutdown.clone(),
            config.release_delay,
        );

        tracing::info!(
            target: "accid::subsystem",
            id_bits = config.id_bits,
            release_delay = ?config.release_delay,
            "accessibility subsystem initialized"
        );

        Ok(Self {
            config,
            shutdown,
            shared: Rc::new(SubsystemShared {
                allocator,
                coordinator,
                registry: RefCell::new(HashMap::new()),
                live_nodes: Cell::new(0),
            }),
        })
    }

    /// Create a subsystem driven by an [`EventLoop`].
    pub fn with_event_loop(config: IdConfig, event_loop: &EventLoop) -> Result<Self> {
        Self::new(config, Rc::new(event_loop.clone()))
    }

    /// Create the wrapper for a node that joined the tree.
    ///
    /// No identifier is allocated until the platform object is first
    /// requested.
    pub fn create_node(&self, role: AccessibleRole, name: impl Into<String>) -> AccessibleNodeWrapper {
        AccessibleNodeWrapper::new(self.shared.clone(), role, name.into())
    }

    /// Look up a live platform object by the id the platform reported.
    ///
    /// Ids of nodes that have shut down no longer resolve, even while the id
    /// itself is still waiting for release.
    pub fn resolve(&self, id: PlatformId) -> Option<PlatformRef> {
        let platform = self.shared.registry.borrow().get(&id)?.upgrade()?;
        if platform.is_defunct() {
            return None;
        }
        Some(PlatformRef::acquire(platform))
    }

    /// Mark the subsystem as shut down. Later releases skip the delay.
    pub fn mark_shut_down(&self) {
        if self.shutdown.mark() {
            tracing::info!(target: "accid::subsystem", "accessibility subsystem shutting down");
        }
    }

    /// Check whether the subsystem has been marked shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_set()
    }

    /// A handle to the shutdown flag, for the application shutdown sequencer.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Final teardown: mark shut down and reclaim every queued identifier.
    ///
    /// Returns the number of identifiers the forced flush released.
    pub fn finalize(&self) -> usize {
        self.mark_shut_down();
        let released = self.shared.coordinator.finalize();
        tracing::info!(target: "accid::subsystem", released, "accessibility subsystem finalized");
        released
    }

    /// Current counters.
    pub fn stats(&self) -> SubsystemStats {
        SubsystemStats {
            live_ids: self.shared.allocator.borrow().live_count(),
            pending_releases: self.shared.coordinator.pending_count(),
            live_nodes: self.shared.live_nodes.get(),
            registered_wrappers: self.shared.registry.borrow().len(),
        }
    }

    /// The release coordinator.
    pub fn coordinator(&self) -> &DeferredReleaseCoordinator {
        &self.shared.coordinator
    }

    /// Borrow the allocator for inspection.
    pub fn allocator(&self) -> Ref<'_, IdAllocator> {
        self.shared.allocator.borrow()
    }

    /// The configuration the subsystem was created with.
    pub fn config(&self) -> &IdConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::{AccessError, ConfigError, Error};

    fn setup() -> (EventLoop, AccessibilitySubsystem) {
        let event_loop = EventLoop::with_manual_clock();
        let subsystem =
            AccessibilitySubsystem::with_event_loop(IdConfig::default(), &event_loop).unwrap();
        (event_loop, subsystem)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let event_loop = EventLoop::with_manual_clock();
        let config = IdConfig {
            id_bits: 0,
            ..IdConfig::default()
        };
        let err = AccessibilitySubsystem::with_event_loop(config, &event_loop)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::InvalidIdBits(0))));
    }

    #[test]
    fn test_platform_wrapper_is_lazy() {
        let (_event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::Link, "home");

        assert!(!node.has_platform_wrapper());
        assert_eq!(subsystem.stats().live_ids, 0);

        let first = node.platform_wrapper().unwrap();
        let second = node.platform_wrapper().unwrap();
        assert!(PlatformRef::ptr_eq(&first, &second));
        assert_eq!(subsystem.stats().live_ids, 1);
        assert_eq!(first.unique_id().unwrap(), node.unique_id().unwrap());
        assert_eq!(first.name().unwrap(), "home");
        assert_eq!(first.msaa_role().unwrap(), 0x1E);
    }

    #[test]
    fn test_shutdown_without_external_refs_queues_release() {
        let (event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::Button, "OK");
        let id = node.platform_wrapper().unwrap().unique_id().unwrap();

        node.shutdown();
        assert!(subsystem.coordinator().is_pending(id));
        assert!(subsystem.allocator().is_live(id));

        event_loop.advance(Duration::from_millis(1000));
        assert!(!subsystem.allocator().is_live(id));
    }

    #[test]
    fn test_external_ref_outlives_node() {
        let (event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::Image, "logo");
        let held = node.platform_wrapper().unwrap();
        let id = held.unique_id().unwrap();

        node.shutdown();
        assert!(held.is_defunct());
        assert_eq!(held.unique_id(), Err(AccessError::Defunct));
        assert_eq!(held.name(), Err(AccessError::Defunct));
        assert!(subsystem.resolve(id).is_none());

        // Nothing is requested while the platform client holds on.
        event_loop.advance(Duration::from_secs(10));
        assert!(!subsystem.coordinator().is_pending(id));
        assert!(subsystem.allocator().is_live(id));

        drop(held);
        assert!(subsystem.coordinator().is_pending(id));
        event_loop.advance(Duration::from_secs(1));
        assert!(!subsystem.allocator().is_live(id));
    }

    #[test]
    fn test_resolve_hands_out_counted_refs() {
        let (_event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::Label, "status");
        let id = node.platform_wrapper().unwrap().unique_id().unwrap();

        let resolved = subsystem.resolve(id).unwrap();
        assert_eq!(resolved.ref_count(), 2);
        assert_eq!(resolved.role().unwrap(), AccessibleRole::Label);
        assert!(subsystem.resolve(PlatformId::from_bits(12345)).is_none());
    }

    #[test]
    fn test_dropping_node_shuts_it_down() {
        let (_event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::ListItem, "row");
        let id = node.platform_wrapper().unwrap().unique_id().unwrap();
        assert_eq!(subsystem.stats().live_nodes, 1);

        drop(node);
        assert_eq!(subsystem.stats().live_nodes, 0);
        assert_eq!(subsystem.stats().registered_wrappers, 0);
        assert!(subsystem.coordinator().is_pending(id));
    }

    #[test]
    fn test_shutdown_twice_is_noop() {
        let (_event_loop, subsystem) = setup();
        let mut node = subsystem.create_node(AccessibleRole::Button, "twice");
        node.platform_wrapper().unwrap();

        node.shutdown();
        node.shutdown();
        assert!(node.is_shut_down());
        assert_eq!(subsystem.stats().pending_releases, 1);
        assert_eq!(node.platform_wrapper().unwrap_err(), AccessError::Defunct);
    }

    #[test]
    fn test_node_without_wrapper_never_allocates() {
        let (event_loop, subsystem) = setup();
        let node = subsystem.create_node(AccessibleRole::Unknown, "");
        drop(node);
        event_loop.run_until_idle();
        assert_eq!(subsystem.stats(), SubsystemStats::default());
    }

    #[test]
    fn test_finalize_flushes_and_switches_to_immediate() {
        let (event_loop, subsystem) = setup();
        let mut a = subsystem.create_node(AccessibleRole::Button, "a");
        let mut b = subsystem.create_node(AccessibleRole::Button, "b");
        let id_a = a.platform_wrapper().unwrap().unique_id().unwrap();
        let held_b = b.platform_wrapper().unwrap();
        let id_b = held_b.unique_id().unwrap();

        a.shutdown();
        assert_eq!(subsystem.finalize(), 1);
        assert!(subsystem.is_shut_down());
        assert!(!subsystem.allocator().is_live(id_a));
        assert_eq!(event_loop.active_timer_count(), 0);

        // After finalization the last reference releases synchronously.
        b.shutdown();
        drop(held_b);
        assert!(!subsystem.allocator().is_live(id_b));
        assert_eq!(subsystem.stats().pending_releases, 0);
    }
}
