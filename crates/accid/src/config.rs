//! Configuration for the identifier subsystem.

use std::time::Duration;

use crate::error::ConfigError;
use crate::id::{DEFAULT_ID_BITS, MAX_ID_BITS};

/// How long released identifiers wait before they may be reused.
pub const DEFAULT_RELEASE_DELAY: Duration = Duration::from_millis(1000);

/// Environment variable overriding [`IdConfig::id_bits`].
pub const ENV_ID_BITS: &str = "ACCID_ID_BITS";

/// Environment variable overriding [`IdConfig::release_delay`], in milliseconds.
pub const ENV_RELEASE_DELAY_MS: &str = "ACCID_RELEASE_DELAY_MS";

/// Configuration for an [`AccessibilitySubsystem`](crate::AccessibilitySubsystem).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdConfig {
    /// Width of the raw index space in bits.
    pub id_bits: u32,
    /// Delay between a release request and the id becoming allocatable.
    pub release_delay: Duration,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            id_bits: DEFAULT_ID_BITS,
            release_delay: DEFAULT_RELEASE_DELAY,
        }
    }
}

impl IdConfig {
    /// Start building a configuration from the defaults.
    pub fn builder() -> IdConfigBuilder {
        IdConfigBuilder::new()
    }

    /// Check the configuration for values the subsystem cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_ID_BITS).contains(&self.id_bits) {
            return Err(ConfigError::InvalidIdBits(self.id_bits));
        }
        if self.release_delay.is_zero() {
            return Err(ConfigError::ZeroReleaseDelay);
        }
        Ok(())
    }

    /// Build a configuration from the defaults plus `ACCID_ID_BITS` and
    /// `ACCID_RELEASE_DELAY_MS` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = IdConfigBuilder::new();

        if let Some(value) = lookup(ENV_ID_BITS) {
            let bits = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_ID_BITS,
                value: value.clone(),
            })?;
            builder = builder.id_bits(bits);
        }

        if let Some(value) = lookup(ENV_RELEASE_DELAY_MS) {
            let millis = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_RELEASE_DELAY_MS,
                value: value.clone(),
            })?;
            builder = builder.release_delay(Duration::from_millis(millis));
        }

        builder.build()
    }
}

/// Builder for [`IdConfig`].
#[derive(Debug, Default)]
pub struct IdConfigBuilder {
    config: IdConfig,
}

impl IdConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the width of the raw index space.
    pub fn id_bits(mut self, bits: u32) -> Self {
        self.config.id_bits = bits;
        self
    }

    /// Set the deferred release delay.
    pub fn release_delay(mut self, delay: Duration) -> Self {
        self.config.release_delay = delay;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<IdConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
