//! Identifier encoding.
//!
//! Platform accessibility APIs reserve small positive child ids for
//! addressing children relative to a parent, so raw indices are handed out
//! in one's complement form. Raw index `0` becomes `0xFFFF_FFFF` and so on,
//! and an encoded id viewed as an `i32` is always negative.

use std::fmt;

/// Default width of the raw index space, in bits.
///
/// 31 bits keeps every encoded id negative when read as a signed 32-bit
/// integer.
pub const DEFAULT_ID_BITS: u32 = 31;

/// Widest supported raw index space.
pub const MAX_ID_BITS: u32 = 32;

static_assertions::const_assert!(DEFAULT_ID_BITS <= MAX_ID_BITS);
static_assertions::const_assert!(DEFAULT_ID_BITS > 0);

/// An encoded identifier, as exposed to the platform.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformId(u32);

impl PlatformId {
    /// Encode a raw index.
    #[inline]
    pub const fn from_raw(raw: RawIndex) -> Self {
        Self(!raw.0)
    }

    /// Wrap a value received from the platform.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The encoded value handed to the platform.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// The encoded value as the platform's signed child id.
    #[inline]
    pub const fn as_child_id(self) -> i32 {
        self.0 as i32
    }

    /// Decode back to the raw index.
    #[inline]
    pub const fn raw(self) -> RawIndex {
        RawIndex(!self.0)
    }
}

impl fmt::Debug for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlatformId({:#010x}, raw={})", self.0, !self.0)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_child_id())
    }
}

/// A decoded allocator index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RawIndex(u32);

impl RawIndex {
    /// Create a raw index.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw value.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RawIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
