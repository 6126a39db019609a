//! Error types for the accid runtime.

use std::fmt;

/// The main error type for runtime operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Timer-related error.
    Timer(TimerError),
    /// The event loop has already exited.
    EventLoopExited,
    /// Failed to post an event through an [`EventLoopProxy`](crate::EventLoopProxy).
    EventDispatchFailed,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timer(err) => write!(f, "Timer error: {err}"),
            Self::EventLoopExited => write!(f, "The event loop has already exited"),
            Self::EventDispatchFailed => {
                write!(f, "Failed to dispatch event: the event loop is gone")
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Timer(err) => Some(err),
            _ => None,
        }
    }
}

/// Timer-specific errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The timer ID is invalid, has fired or has already been cancelled.
    InvalidTimerId,
    /// The timer service no longer accepts new timers (late shutdown).
    ServiceUnavailable,
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimerId => write!(f, "Invalid or expired timer ID"),
            Self::ServiceUnavailable => write!(f, "Timer service is no longer available"),
        }
    }
}

impl std::error::Error for TimerError {}

impl From<TimerError> for CoreError {
    fn from(err: TimerError) -> Self {
        Self::Timer(err)
    }
}

/// A specialized Result type for runtime operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_error_wraps_into_core_error() {
        let err: CoreError = TimerError::ServiceUnavailable.into();
        assert_eq!(err, CoreError::Timer(TimerError::ServiceUnavailable));
        assert_eq!(
            err.to_string(),
            "Timer error: Timer service is no longer available"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_exited_has_no_source() {
        assert!(std::error::Error::source(&CoreError::EventLoopExited).is_none());
    }
}
