//! Compact Elias-Fano encoding of monotone integer sequences.
//!
//! A sequence `s[0] <= ... <= s[n-1] <= universe` is split at
//! `l = max(0, floor(log2(universe / n)))`: the low `l` bits of every
//! element are packed densely, the high bits become a unary stream with
//! one set bit per element and one zero per bucket boundary. Any `s[i]`
//! is recovered without decoding the prefix.

use std::io::Write;

use byteorder::{ReadBytesExt, WriteBytesExt};

use super::{BitVector, BitVectorBuilder};
use crate::error::{Error, Result};

/// Codec parameters persisted in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalParameters {
    pub ef_log_sampling0: u8,
    pub ef_log_sampling1: u8,
}

impl Default for GlobalParameters {
    fn default() -> Self {
        Self {
            ef_log_sampling0: 9,
            ef_log_sampling1: 8,
        }
    }
}

impl GlobalParameters {
    /// Serialized size in bytes.
    pub const BYTES: usize = 2;

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u8(self.ef_log_sampling0)?;
        out.write_u8(self.ef_log_sampling1)?;
        Ok(())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = bytes;
        let ef_log_sampling0 = cursor
            .read_u8()
            .map_err(|_| Error::Corrupted("truncated global parameters".into()))?;
        let ef_log_sampling1 = cursor
            .read_u8()
            .map_err(|_| Error::Corrupted("truncated global parameters".into()))?;
        Ok(Self {
            ef_log_sampling0,
            ef_log_sampling1,
        })
    }
}

fn low_width(universe: u64, n: u64) -> u32 {
    if n == 0 {
        return 0;
    }
    let ratio = universe / n;
    if ratio < 2 {
        0
    } else {
        63 - ratio.leading_zeros()
    }
}

/// Total bit footprint of an encoded sequence.
pub fn bit_len(universe: u64, n: u64) -> u64 {
    let l = low_width(universe, n);
    n * l as u64 + n + (universe >> l) + 1
}

/// Appends the encoding of `values` (non-decreasing, all `<= universe`)
/// to `builder`.
pub fn write(
    builder: &mut BitVectorBuilder,
    values: &[u64],
    universe: u64,
    _params: &GlobalParameters,
) {
    let n = values.len() as u64;
    let l = low_width(universe, n);

    if l > 0 {
        let mask = (1u64 << l) - 1;
        for &value in values {
            debug_assert!(value <= universe);
            builder.append_bits(value & mask, l as usize);
        }
    }

    let mut last_bucket = 0u64;
    for (i, &value) in values.iter().enumerate() {
        let bucket = value >> l;
        debug_assert!(i == 0 || value >= values[i - 1]);
        builder.append_zeros(bucket - last_bucket);
        builder.append_bits(1, 1);
        last_bucket = bucket;
    }
    // Close out the remaining buckets so the region has a fixed length.
    builder.append_zeros((universe >> l) + 1 - last_bucket);
}

const NOT_POSITIONED: u64 = u64::MAX;

/// Stateful reader over one encoded sequence inside a [`BitVector`].
///
/// Monotone access is O(1) amortized through the cached position of the
/// current element's set bit; moving backwards re-seeks from the start
/// of the high-bit region.
pub struct EliasFanoEnumerator<'a> {
    bv: &'a BitVector,
    n: u64,
    low_width: u32,
    low_offset: u64,
    high_offset: u64,
    position: u64,
    high_pos: u64,
}

impl<'a> EliasFanoEnumerator<'a> {
    pub fn new(
        bv: &'a BitVector,
        offset: u64,
        universe: u64,
        n: u64,
        _params: &GlobalParameters,
    ) -> Self {
        let l = low_width(universe, n);
        Self {
            bv,
            n,
            low_width: l,
            low_offset: offset,
            high_offset: offset + n * l as u64,
            position: NOT_POSITIONED,
            high_pos: 0,
        }
    }

    /// Number of elements in the sequence.
    pub fn size(&self) -> u64 {
        self.n
    }

    /// Moves the cursor to position `i` and returns `(i, s[i])`.
    pub fn move_to(&mut self, i: u64) -> (u64, u64) {
        debug_assert!(i < self.n);
        if self.position == NOT_POSITIONED || i < self.position {
            self.high_pos = self.select_one(i);
            self.position = i;
        } else {
            while self.position < i {
                self.high_pos = self.next_one(self.high_pos + 1);
                self.position += 1;
            }
        }
        let bucket = self.high_pos - self.high_offset - i;
        let low = if self.low_width == 0 {
            0
        } else {
            self.bv
                .get_bits(self.low_offset + i * self.low_width as u64, self.low_width as usize)
        };
        (i, (bucket << self.low_width) | low)
    }

    /// Position of the first set bit at or after `from`.
    fn next_one(&self, from: u64) -> u64 {
        let mut word_idx = (from / 64) as usize;
        let mut word = self.bv.word(word_idx) & (u64::MAX << (from % 64));
        while word == 0 {
            word_idx += 1;
            word = self.bv.word(word_idx);
        }
        word_idx as u64 * 64 + word.trailing_zeros() as u64
    }

    /// Position of the `(i + 1)`-th set bit of the high-bit region.
    fn select_one(&self, i: u64) -> u64 {
        let mut remaining = i + 1;
        let start_word = (self.high_offset / 64) as usize;
        let mut word = self.bv.word(start_word) & (u64::MAX << (self.high_offset % 64));
        let mut word_idx = start_word;
        loop {
            let ones = word.count_ones() as u64;
            if ones >= remaining {
                return word_idx as u64 * 64 + select_in_word(word, remaining as u32) as u64;
            }
            remaining -= ones;
            word_idx += 1;
            word = self.bv.word(word_idx);
        }
    }
}

/// Position of the `k`-th (1-indexed) set bit within a word.
fn select_in_word(mut word: u64, k: u32) -> u32 {
    for _ in 0..k - 1 {
        word &= word - 1;
    }
    word.trailing_zeros()
}
