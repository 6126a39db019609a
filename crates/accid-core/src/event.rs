//! Events posted into the accid event loop from other threads.

/// Events delivered through an [`EventLoopProxy`](crate::EventLoopProxy).
///
/// Timer fires are not events: they are dispatched directly by the loop on
/// the owner thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    /// Request to stop the event loop. Pending timers stay armed but are no
    /// longer serviced, and new timers are refused.
    Quit,

    /// Wake up the event loop so it re-evaluates its timers.
    WakeUp,
}
