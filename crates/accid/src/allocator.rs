//! Dense identifier allocation over a fixed-width index space.
//!
//! The free set is a bitset of 64-bit words, grown on demand, plus a hint
//! pointing at the first word that may still contain a clear bit. Every
//! word before the hint is full, so allocation always returns the smallest
//! free raw index.

use crate::id::{MAX_ID_BITS, PlatformId, RawIndex};

const WORD_BITS: u32 = u64::BITS;

/// Bitset allocator handing out the smallest free raw index.
///
/// The allocator is owner-thread only and does no locking. Exceeding the
/// index space and releasing an index that is not allocated are contract
/// violations and panic.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    /// Bit `i % 64` of word `i / 64` is set while raw index `i` is allocated.
    words: Vec<u64>,
    /// First word that may contain a clear bit.
    hint: usize,
    id_bits: u32,
    max_raw: u32,
    live: usize,
}

impl IdAllocator {
    /// Create an allocator over `[0, 2^id_bits)`.
    ///
    /// # Panics
    ///
    /// Panics if `id_bits` is not in `1..=32`.
    pub fn new(id_bits: u32) -> Self {
        assert!(
            (1..=MAX_ID_BITS).contains(&id_bits),
            "identifier width must be between 1 and {MAX_ID_BITS} bits, got {id_bits}"
        );
        let max_raw = if id_bits == MAX_ID_BITS {
            u32::MAX
        } else {
            (1u32 << id_bits) - 1
        };
        Self {
            words: Vec::new(),
            hint: 0,
            id_bits,
            max_raw,
            live: 0,
        }
    }

    /// Allocate the smallest free raw index and return it encoded.
    ///
    /// # Panics
    ///
    /// Panics if every index in the space is allocated. The platform cannot
    /// represent a wider id, so running out means too many live nodes.
    pub fn allocate(&mut self) -> PlatformId {
        let mut idx = self.hint;
        loop {
            if idx == self.words.len() {
                self.words.push(0);
            }
            let word = self.words[idx];
            if word == u64::MAX {
                idx += 1;
                continue;
            }

            self.hint = idx;
            let bit = (!word).trailing_zeros();
            let raw = idx as u64 * u64::from(WORD_BITS) + u64::from(bit);
            assert!(
                raw <= u64::from(self.max_raw),
                "accessibility identifier space exhausted: {} ids of {} bits are live",
                self.live,
                self.id_bits
            );

            self.words[idx] |= 1u64 << bit;
            self.live += 1;

            let id = PlatformId::from_raw(RawIndex::new(raw as u32));
            tracing::trace!(target: "accid::allocator", raw, ?id, "allocated identifier");
            return id;
        }
    }

    /// Return an identifier's raw index to the free set.
    ///
    /// # Panics
    ///
    /// Panics if the id decodes outside the index space or its index is not
    /// currently allocated (double release).
    pub fn release(&mut self, id: PlatformId) {
        let raw = id.raw().get();
        assert!(
            raw <= self.max_raw,
            "released identifier {id:?} is outside the {}-bit identifier space",
            self.id_bits
        );

        let (idx, mask) = Self::locate(raw);
        let allocated = self.words.get(idx).is_some_and(|word| word & mask != 0);
        assert!(
            allocated,
            "released identifier {id:?} is not allocated (double release?)"
        );

        self.words[idx] &= !mask;
        self.live -= 1;
        if idx < self.hint {
            self.hint = idx;
        }
        tracing::trace!(target: "accid::allocator", raw, ?id, "released identifier");
    }

    /// Check whether a raw index is currently allocated.
    pub fn is_allocated(&self, raw: RawIndex) -> bool {
        let (idx, mask) = Self::locate(raw.get());
        self.words.get(idx).is_some_and(|word| word & mask != 0)
    }

    /// Check whether an encoded identifier is currently allocated.
    pub fn is_live(&self, id: PlatformId) -> bool {
        id.raw().get() <= self.max_raw && self.is_allocated(id.raw())
    }

    /// All allocated raw indices, ascending.
    pub fn allocated_indices(&self) -> impl Iterator<Item = RawIndex> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| RawIndex::new(idx as u32 * WORD_BITS + bit))
        })
    }

    /// Number of allocated identifiers.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Size of the index space.
    pub fn capacity(&self) -> u64 {
        1u64 << self.id_bits
    }

    /// Largest raw index that may be handed out.
    pub fn max_raw(&self) -> u32 {
        self.max_raw
    }

    /// Width of the index space in bits.
    pub fn id_bits(&self) -> u32 {
        self.id_bits
    }

    #[inline]
    fn locate(raw: u32) -> (usize, u64) {
        ((raw / WORD_BITS) as usize, 1u64 << (raw % WORD_BITS))
    }
}
