//! Node wrappers and the platform-facing objects they own.
//!
//! Every accessibility tree node gets an [`AccessibleNodeWrapper`]. The
//! platform object carrying the node's identifier is created on first use
//! and handed out as [`PlatformRef`] handles. Platform clients may keep
//! those handles alive long after the node is gone, so:
//!
//! 1. [`AccessibleNodeWrapper::shutdown`] marks the platform object defunct
//!    and drops the node's own handle, but keeps the identifier.
//! 2. When the last `PlatformRef` is dropped, the identifier is handed to
//!    the [`DeferredReleaseCoordinator`].
//!
//! The node's handle counts as a reference, so step 2 can never run before
//! step 1.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::coordinator::DeferredReleaseCoordinator;
use crate::error::AccessError;
use crate::id::PlatformId;
use crate::role::AccessibleRole;
use crate::subsystem::SubsystemShared;

/// The platform-facing object for one node.
pub(crate) struct PlatformAccessible {
    id: PlatformId,
    role: AccessibleRole,
    name: String,
    defunct: Cell<bool>,
    /// Live `PlatformRef` handles, the node's own included.
    refs: Cell<usize>,
    released: Cell<bool>,
    coordinator: Rc<DeferredReleaseCoordinator>,
}

impl PlatformAccessible {
    /// Allocate an identifier and register a new platform object under it.
    fn create(shared: &SubsystemShared, role: AccessibleRole, name: String) -> PlatformRef {
        let id = shared.allocator.borrow_mut().allocate();
        let inner = Rc::new(Self {
            id,
            role,
            name,
            defunct: Cell::new(false),
            refs: Cell::new(0),
            released: Cell::new(false),
            coordinator: shared.coordinator.clone(),
        });
        shared.register(id, &inner);
        tracing::debug!(target: "accid::wrapper", ?id, ?role, "platform wrapper created");
        PlatformRef::acquire(inner)
    }

    pub(crate) fn is_defunct(&self) -> bool {
        self.defunct.get()
    }

    /// Runs when the reference count reaches zero.
    fn on_last_reference_dropped(&self) {
        if self.released.replace(true) {
            return;
        }
        debug_assert!(
            self.defunct.get(),
            "platform wrapper {:?} lost its last reference while its node is live",
            self.id
        );
        tracing::debug!(
            target: "accid::wrapper",
            id = ?self.id,
            "last platform reference dropped; requesting release"
        );
        self.coordinator.request_release(self.id);
    }
}

/// A counted handle to a platform object, as held by platform clients.
///
/// Queries on a handle whose node has shut down fail with
/// [`AccessError::Defunct`].
pub struct PlatformRef {
    inner: Rc<PlatformAccessible>,
}

impl PlatformRef {
    pub(crate) fn acquire(inner: Rc<PlatformAccessible>) -> Self {
        inner.refs.set(inner.refs.get() + 1);
        Self { inner }
    }

    fn check_live(&self) -> Result<(), AccessError> {
        if self.inner.defunct.get() {
            Err(AccessError::Defunct)
        } else {
            Ok(())
        }
    }

    /// The encoded identifier, as reported to the platform.
    pub fn unique_id(&self) -> Result<PlatformId, AccessError> {
        self.check_live()?;
        Ok(self.inner.id)
    }

    /// The node's role.
    pub fn role(&self) -> Result<AccessibleRole, AccessError> {
        self.check_live()?;
        Ok(self.inner.role)
    }

    /// The node's MSAA role constant.
    pub fn msaa_role(&self) -> Result<u32, AccessError> {
        self.role().map(AccessibleRole::msaa_role)
    }

    /// The node's accessible name.
    pub fn name(&self) -> Result<&str, AccessError> {
        self.check_live()?;
        Ok(&self.inner.name)
    }

    /// Check whether the node behind this object has shut down.
    pub fn is_defunct(&self) -> bool {
        self.inner.defunct.get()
    }

    /// Number of live handles to this object.
    pub fn ref_count(&self) -> usize {
        self.inner.refs.get()
    }

    /// Check whether two handles refer to the same object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.inner, &other.inner)
    }
}

impl Clone for PlatformRef {
    fn clone(&self) -> Self {
        Self::acquire(self.inner.clone())
    }
}

impl Drop for PlatformRef {
    fn drop(&mut self) {
        let remaining = self.inner.refs.get() - 1;
        self.inner.refs.set(remaining);
        if remaining == 0 {
            self.inner.on_last_reference_dropped();
        }
    }
}

impl fmt::Debug for PlatformRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformRef")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("defunct", &self.inner.defunct.get())
            .field("refs", &self.inner.refs.get())
            .finish()
    }
}

/// Owner of a tree node's identifier and platform object.
///
/// Created by [`AccessibilitySubsystem::create_node`](crate::AccessibilitySubsystem::create_node).
/// Dropping a wrapper that was not shut down shuts it down first.
pub struct AccessibleNodeWrapper {
    role: AccessibleRole,
    name: String,
    /// The node's own handle; `None` until first use and after shutdown.
    platform: Option<PlatformRef>,
    shut_down: bool,
    shared: Rc<SubsystemShared>,
}

impl AccessibleNodeWrapper {
    pub(crate) fn new(shared: Rc<SubsystemShared>, role: AccessibleRole, name: String) -> Self {
        shared.live_nodes.set(shared.live_nodes.get() + 1);
        Self {
            role,
            name,
            platform: None,
            shut_down: false,
            shared,
        }
    }

    /// The node's role.
    pub fn role(&self) -> AccessibleRole {
        self.role
    }

    /// The node's accessible name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the platform object, creating it on first call.
    ///
    /// The first call allocates the node's identifier. Fails with
    /// [`AccessError::Defunct`] after [`shutdown`](Self::shutdown).
    pub fn platform_wrapper(&mut self) -> Result<PlatformRef, AccessError> {
        if self.shut_down {
            return Err(AccessError::Defunct);
        }
        let platform = self.platform.get_or_insert_with(|| {
            PlatformAccessible::create(&self.shared, self.role, self.name.clone())
        });
        Ok(platform.clone())
    }

    /// Check whether the platform object has been created.
    pub fn has_platform_wrapper(&self) -> bool {
        self.platform.is_some()
    }

    /// The node's identifier, if its platform object exists.
    pub fn unique_id(&self) -> Option<PlatformId> {
        self.platform.as_ref().map(|platform| platform.inner.id)
    }

    /// Check whether the node has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Detach the node from the tree.
    ///
    /// The platform object turns defunct and stops resolving by id. Its
    /// identifier is requested for release only once every outstanding
    /// [`PlatformRef`] is gone. Calling this twice is a no-op.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            tracing::debug!(target: "accid::wrapper", "node already shut down");
            return;
        }
        self.shut_down = true;
        self.shared.live_nodes.set(self.shared.live_nodes.get() - 1);

        let Some(platform) = self.platform.take() else {
            tracing::trace!(target: "accid::wrapper", "node shut down without platform wrapper");
            return;
        };
        platform.inner.defunct.set(true);
        self.shared.unregister(platform.inner.id);
        tracing::debug!(
            target: "accid::wrapper",
            id = ?platform.inner.id,
            external_refs = platform.ref_count() - 1,
            "node shut down"
        );
        // Releases the id now if no platform client holds a handle.
        drop(platform);
    }
}

impl Drop for AccessibleNodeWrapper {
    fn drop(&mut self) {
        if !self.shut_down {
            self.shutdown();
        }
    }
}

impl fmt::Debug for AccessibleNodeWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessibleNodeWrapper")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("id", &self.unique_id())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use accid_core::EventLoop;

    use crate::{AccessibilitySubsystem, IdConfig};

    use super::*;

    #[test]
    fn test_queries_fail_once_defunct() {
        let event_loop = EventLoop::with_manual_clock();
        let subsystem = AccessibilitySubsystem::with_event_loop(IdConfig::default(), &event_loop).unwrap();
        let mut node = subsystem.create_node(AccessibleRole::CheckBox, "wrap lines");
        let platform = node.platform_wrapper().unwrap();

        assert_eq!(platform.name(), Ok("wrap lines"));
        assert_eq!(platform.role(), Ok(AccessibleRole::CheckBox));
        assert_eq!(platform.msaa_role(), Ok(0x2C));

        node.shutdown();
        assert!(platform.is_defunct());
        assert_eq!(platform.name(), Err(AccessError::Defunct));
        assert_eq!(platform.msaa_role(), Err(AccessError::Defunct));
        assert_eq!(node.platform_wrapper().unwrap_err(), AccessError::Defunct);
    }

    #[test]
    fn test_clones_share_one_object() {
        let event_loop = EventLoop::with_manual_clock();
        let subsystem = AccessibilitySubsystem::with_event_loop(IdConfig::default(), &event_loop).unwrap();
        let mut node = subsystem.create_node(AccessibleRole::TextInput, "");

        let a = node.platform_wrapper().unwrap();
        let b = node.platform_wrapper().unwrap();
        assert!(PlatformRef::ptr_eq(&a, &b));
        // Node handle plus two clients.
        assert_eq!(a.ref_count(), 3);

        drop(b);
        assert_eq!(a.ref_count(), 2);
        node.shutdown();
        assert_eq!(a.ref_count(), 1);
        assert_eq!(subsystem.coordinator().pending_count(), 0);

        drop(a);
        assert_eq!(subsystem.coordinator().pending_count(), 1);
    }
}
