//! Logging facilities for accid.
//!
//! accid uses the `tracing` crate for instrumentation. The library never
//! installs a subscriber; to see logs, install one in the application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("accid=debug,accid_core=info")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Runtime crate target.
    pub const CORE: &str = "accid_core";
    /// Event loop target.
    pub const EVENT_LOOP: &str = "accid_core::event_loop";
    /// Timer system target.
    pub const TIMER: &str = "accid_core::timer";
    /// Identifier allocator target.
    pub const ALLOCATOR: &str = "accid::allocator";
    /// Deferred release coordinator target.
    pub const COORDINATOR: &str = "accid::coordinator";
    /// Node and platform wrapper lifecycle target.
    pub const WRAPPER: &str = "accid::wrapper";
    /// Subsystem lifecycle target.
    pub const SUBSYSTEM: &str = "accid::subsystem";
}

/// A guard that keeps a tracing span entered until dropped.
///
/// Useful for timing flushes and teardown.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create and enter a new performance span.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "accid::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// These are thin wrappers around the `tracing` macros with the runtime
/// target filled in.
#[macro_export]
macro_rules! accid_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "accid_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! accid_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "accid_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! accid_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "accid_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! accid_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "accid_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! accid_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "accid_core", $($arg)*)
    };
}
