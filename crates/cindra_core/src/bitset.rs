//! Growable bit vector.
//!
//! Bits live in 64-bit blocks. Positions at or beyond `len()` read as zero and
//! the bulk operations keep the padding bits of the last block cleared.

use smallvec::SmallVec;

const BITS_PER_BLOCK: usize = 64;

#[inline]
fn blocks_for(bits: usize) -> usize {
    bits.div_ceil(BITS_PER_BLOCK)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicBitSet {
    // One inline block covers the operator masks without touching the heap.
    blocks: SmallVec<[u64; 1]>,
    len: usize,
}

impl DynamicBitSet {
    /// Create a bit vector of `len` zeroed bits.
    pub fn new(len: usize) -> Self {
        let mut blocks = SmallVec::new();
        blocks.resize(blocks_for(len), 0);
        Self { blocks, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bits the current blocks can hold without growing.
    pub fn capacity(&self) -> usize {
        self.blocks.len() * BITS_PER_BLOCK
    }

    /// Returns `false` for any position past the end.
    #[inline]
    pub fn test(&self, pos: usize) -> bool {
        if pos >= self.len {
            return false;
        }
        let word = pos / BITS_PER_BLOCK;
        let bit = pos % BITS_PER_BLOCK;
        (self.blocks[word] >> bit) & 1 != 0
    }

    /// Set the bit at `pos`, growing the vector to `pos + 1` bits if needed.
    pub fn set(&mut self, pos: usize) {
        self.set_value(pos, true);
    }

    pub fn set_value(&mut self, pos: usize, value: bool) {
        if pos >= self.len {
            self.grow_to(pos + 1);
        }
        let word = pos / BITS_PER_BLOCK;
        let mask = 1u64 << (pos % BITS_PER_BLOCK);
        if value {
            self.blocks[word] |= mask;
        } else {
            self.blocks[word] &= !mask;
        }
    }

    pub fn reset(&mut self, pos: usize) {
        self.set_value(pos, false);
    }

    /// Toggle the bit at `pos`. Past the end the implicit zero becomes a one.
    pub fn flip(&mut self, pos: usize) {
        if pos >= self.len {
            self.set_value(pos, true);
            return;
        }
        let word = pos / BITS_PER_BLOCK;
        self.blocks[word] ^= 1u64 << (pos % BITS_PER_BLOCK);
    }

    pub fn set_all(&mut self) {
        for block in self.blocks.iter_mut() {
            *block = u64::MAX;
        }
        self.clear_padding();
    }

    pub fn reset_all(&mut self) {
        for block in self.blocks.iter_mut() {
            *block = 0;
        }
    }

    pub fn flip_all(&mut self) {
        for block in self.blocks.iter_mut() {
            *block = !*block;
        }
        self.clear_padding();
    }

    /// Pre-allocate blocks for `bits` bits. The logical length is unchanged.
    pub fn reserve(&mut self, bits: usize) {
        let needed = blocks_for(bits);
        if needed > self.blocks.len() {
            self.blocks.resize(needed, 0);
        }
    }

    pub fn count_ones(&self) -> usize {
        self.blocks.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Positions of the set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().enumerate().flat_map(|(word, &block)| {
            let mut rest = block;
            std::iter::from_fn(move || {
                if rest == 0 {
                    return None;
                }
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(word * BITS_PER_BLOCK + bit)
            })
        })
    }

    fn grow_to(&mut self, len: usize) {
        self.reserve(len);
        self.len = len;
    }

    // Blocks past `len` can exist after `reserve`, so everything from bit
    // `len` upward is cleared, not just the tail of the last logical block.
    fn clear_padding(&mut self) {
        let full = self.len / BITS_PER_BLOCK;
        let rem = self.len % BITS_PER_BLOCK;
        let mut first_clear = full;
        if rem != 0 {
            self.blocks[full] &= (1u64 << rem) - 1;
            first_clear += 1;
        }
        for block in self.blocks.iter_mut().skip(first_clear) {
            *block = 0;
        }
    }
}
