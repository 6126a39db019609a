//! Error types for the identifier core.
//!
//! Contract violations (exhausting the identifier space, releasing an id
//! twice) are not errors: they panic in [`IdAllocator`](crate::IdAllocator).

/// Result type alias for accid operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the identifier core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A platform query failed.
    #[error("Platform query failed: {0}")]
    Access(#[from] AccessError),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The identifier width is outside `1..=32`.
    #[error("identifier width must be between 1 and 32 bits, got {0}")]
    InvalidIdBits(u32),

    /// A zero release delay would recycle ids while stale events are in flight.
    #[error("release delay must be greater than zero")]
    ZeroReleaseDelay,

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Errors returned to platform clients querying an accessible object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The node behind the platform object has been shut down.
    #[error("the accessible object is no longer attached to a live node")]
    Defunct,
}
