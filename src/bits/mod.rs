//! Bit vectors with random access to fixed-width slices.

pub mod elias_fano;

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// Append-only builder for a [`BitVector`].
///
/// Bits are packed little-endian within 64-bit words: logical bit `i`
/// lives at bit `i % 64` of word `i / 64`.
#[derive(Default)]
pub struct BitVectorBuilder {
    words: Vec<u64>,
    len: u64,
}

impl BitVectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: u64) -> Self {
        Self {
            words: Vec::with_capacity(bits.div_ceil(64) as usize),
            len: 0,
        }
    }

    /// Number of bits appended so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends the `width` low bits of `value`, least significant first.
    ///
    /// `value` must not carry set bits above `width`.
    pub fn append_bits(&mut self, value: u64, width: usize) {
        debug_assert!(width <= 64);
        debug_assert!(width == 64 || value >> width == 0);
        if width == 0 {
            return;
        }
        let used = (self.len % 64) as usize;
        if used == 0 {
            self.words.push(value);
        } else {
            let last = self
                .words
                .last_mut()
                .unwrap_or_else(|| unreachable!("used > 0 implies a partial word"));
            *last |= value << used;
            if used + width > 64 {
                self.words.push(value >> (64 - used));
            }
        }
        self.len += width as u64;
    }

    /// Appends `count` zero bits.
    pub fn append_zeros(&mut self, mut count: u64) {
        while count >= 64 {
            self.append_bits(0, 64);
            count -= 64;
        }
        if count > 0 {
            self.append_bits(0, count as usize);
        }
    }

    pub fn build(self) -> BitVector {
        BitVector {
            words: self.words,
            len: self.len,
        }
    }
}

/// Immutable bit sequence with O(1) access to slices up to 64 bits wide.
///
/// Persisted as the bit length followed by the packed words, all
/// little-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitVector {
    words: Vec<u64>,
    len: u64,
}

impl BitVector {
    /// Number of bits.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bit(&self, pos: u64) -> bool {
        debug_assert!(pos < self.len);
        self.words[(pos / 64) as usize] >> (pos % 64) & 1 == 1
    }

    /// Reads `width` bits starting at `pos`, least significant first.
    pub fn get_bits(&self, pos: u64, width: usize) -> u64 {
        debug_assert!(width <= 64);
        debug_assert!(pos + width as u64 <= self.len);
        if width == 0 {
            return 0;
        }
        let mask = if width == 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        let block = (pos / 64) as usize;
        let shift = (pos % 64) as usize;
        let mut value = self.words[block] >> shift;
        if shift + width > 64 {
            value |= self.words[block + 1] << (64 - shift);
        }
        value & mask
    }

    pub(crate) fn word(&self, idx: usize) -> u64 {
        self.words[idx]
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_u64::<LittleEndian>(self.len)?;
        for &word in &self.words {
            out.write_u64::<LittleEndian>(word)?;
        }
        Ok(())
    }

    /// Reads a bit vector back from `bytes`, returning it together with
    /// the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut cursor = bytes;
        let len = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Corrupted("truncated bit vector length".into()))?;
        let n_words = len.div_ceil(64) as usize;
        let mut words = Vec::with_capacity(n_words);
        for _ in 0..n_words {
            words.push(
                cursor
                    .read_u64::<LittleEndian>()
                    .map_err(|_| Error::Corrupted("truncated bit vector words".into()))?,
            );
        }
        Ok((Self { words, len }, 8 + 8 * n_words))
    }
}
