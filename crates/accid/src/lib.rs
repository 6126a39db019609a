//! Platform accessibility identifiers for accessibility-tree nodes.
//!
//! Assistive technology addresses accessible objects by small 32-bit ids.
//! This crate hands those ids out densely and reclaims them without letting
//! a platform client confuse a recycled id with the node that used to own
//! it:
//!
//! - [`IdAllocator`]: bitset allocator returning the smallest free index,
//!   exposed in one's complement form
//! - [`DeferredReleaseCoordinator`]: queues released ids and returns them to
//!   the allocator only after a fixed delay, or immediately once the
//!   subsystem is shut down
//! - [`AccessibleNodeWrapper`] / [`PlatformRef`]: per-node owner of the
//!   platform object; the id is released when the last platform reference
//!   goes away, never before the node shuts down
//! - [`AccessibilitySubsystem`]: the explicitly owned root tying these
//!   together
//!
//! Everything here is single-threaded and runs on the thread that owns the
//! [`accid_core::EventLoop`] (or other [`accid_core::TimerService`]). Only
//! [`ShutdownSignal`] crosses threads.

pub mod allocator;
pub mod config;
pub mod coordinator;
mod error;
pub mod id;
mod role;
mod shutdown;
mod subsystem;
pub mod wrapper;

pub use allocator::IdAllocator;
pub use config::{DEFAULT_RELEASE_DELAY, IdConfig, IdConfigBuilder};
pub use coordinator::{DeferredReleaseCoordinator, ReleaseState, SharedAllocator};
pub use error::{AccessError, ConfigError, Error, Result};
pub use id::{DEFAULT_ID_BITS, PlatformId, RawIndex};
pub use role::AccessibleRole;
pub use shutdown::ShutdownSignal;
pub use subsystem::{AccessibilitySubsystem, SubsystemStats};
pub use wrapper::{AccessibleNodeWrapper, PlatformRef};
