//! Block-compressed posting lists and their cursor.
//!
//! On-disk shape of one list: a varint posting count `n`, a skip table
//! when the list spans more than one block, then the blocks themselves.
//! Each block holds the docid residuals followed by the frequencies
//! minus one, both encoded by the list's [`BlockCodec`]. Docid
//! residuals are running gaps seeded with the previous block's last
//! docid (zero for the first block).
//!
//! The skip table is two little-endian `u32` arrays of one entry per
//! block: the last docid of the block, and the cumulative byte offset
//! of the block's end within the block region.

use byteorder::{ByteOrder, LittleEndian};
use log::warn;

use crate::base::DocId;
use crate::codec::{decode_vbyte, encode_vbyte, BlockCodec};
use crate::error::{Error, Result};

/// Writes one posting list to `out`.
///
/// `docs` must be strictly increasing, `freqs` must all be at least 1,
/// and the slices must have equal length.
pub fn write_posting_list(
    out: &mut Vec<u8>,
    codec: &dyn BlockCodec,
    docs: &[DocId],
    freqs: &[u32],
) -> Result<()> {
    let n = docs.len();
    if n == 0 {
        return Err(Error::EmptyPostingList);
    }
    debug_assert_eq!(docs.len(), freqs.len());
    debug_assert!(docs.windows(2).all(|w| w[0] < w[1]));
    debug_assert!(freqs.iter().all(|&f| f >= 1));

    encode_vbyte(out, n as u32);

    let block_size = codec.block_size();
    let blocks = n.div_ceil(block_size);
    let has_skip = n > block_size;
    let skip_start = out.len();
    if has_skip {
        out.resize(skip_start + 8 * blocks, 0);
    }
    let blocks_start = out.len();

    let mut residuals = Vec::with_capacity(block_size);
    let mut shifted_freqs = Vec::with_capacity(block_size);
    for b in 0..blocks {
        let begin = b * block_size;
        let end = n.min(begin + block_size);
        let base = if b == 0 { 0 } else { docs[begin - 1] };

        residuals.clear();
        let mut prev = base;
        for &doc in &docs[begin..end] {
            residuals.push(doc - prev);
            prev = doc;
        }
        codec.encode(&residuals, docs[end - 1] - base, out);

        shifted_freqs.clear();
        shifted_freqs.extend(freqs[begin..end].iter().map(|&f| f - 1));
        let max_freq = *shifted_freqs.iter().max().unwrap_or(&0);
        codec.encode(&shifted_freqs, max_freq, out);

        if has_skip {
            let end_offset = (out.len() - blocks_start) as u32;
            LittleEndian::write_u32(&mut out[skip_start + 4 * b..], docs[end - 1]);
            LittleEndian::write_u32(&mut out[skip_start + 4 * (blocks + b)..], end_offset);
        }
    }
    Ok(())
}

/// Cursor over one encoded posting list.
///
/// Freshly constructed cursors point at the first posting; once all
/// `n` postings are consumed, `docid()` returns the sentinel
/// (`num_docs`).
pub struct DocumentEnumerator<'a> {
    data: &'a [u8],
    codec: &'a dyn BlockCodec,
    sentinel: DocId,
    n: u64,
    blocks: usize,
    block_size: usize,
    skip: &'a [u8],
    blocks_start: usize,
    cur_block: usize,
    cur_block_len: usize,
    cur_block_end: usize,
    freq_offset: usize,
    freqs_decoded: bool,
    pos_in_block: usize,
    exhausted: bool,
    cur_docid: DocId,
    doc_buf: Vec<u32>,
    freq_buf: Vec<u32>,
}

impl<'a> DocumentEnumerator<'a> {
    /// Opens a cursor over the encoded bytes of one list.
    pub fn new(data: &'a [u8], codec: &'a dyn BlockCodec, num_docs: u64) -> Result<Self> {
        let (n, header_len) = decode_vbyte(data)?;
        if n == 0 {
            return Err(Error::Corrupted("posting list with zero postings".into()));
        }
        let block_size = codec.block_size();
        let blocks = (n as usize).div_ceil(block_size);
        let skip_len = if n as usize > block_size {
            8 * blocks
        } else {
            0
        };
        let skip = data
            .get(header_len..header_len + skip_len)
            .ok_or_else(|| Error::Corrupted("truncated skip table".into()))?;
        let blocks_start = header_len + skip_len;

        let mut it = Self {
            data,
            codec,
            sentinel: num_docs as DocId,
            n: n as u64,
            blocks,
            block_size,
            skip,
            blocks_start,
            cur_block: 0,
            cur_block_len: 0,
            cur_block_end: 0,
            freq_offset: 0,
            freqs_decoded: false,
            pos_in_block: 0,
            exhausted: false,
            cur_docid: 0,
            doc_buf: Vec::with_capacity(block_size),
            freq_buf: Vec::with_capacity(block_size),
        };
        it.check_skip_table()?;
        it.load_block(0)?;
        Ok(it)
    }

    /// Number of postings in the list.
    pub fn size(&self) -> u64 {
        self.n
    }

    /// Number of postings before the current one; `n` once exhausted.
    pub fn position(&self) -> u64 {
        if self.exhausted {
            self.n
        } else {
            (self.cur_block * self.block_size + self.pos_in_block) as u64
        }
    }

    /// Current docid, or the sentinel when the cursor is exhausted.
    #[inline]
    pub fn docid(&self) -> DocId {
        self.cur_docid
    }

    /// Frequency of the current posting. Frequencies are decoded once
    /// per block, on first use.
    pub fn freq(&mut self) -> u32 {
        if self.exhausted {
            return 0;
        }
        if !self.freqs_decoded {
            if let Err(err) = self.decode_freqs() {
                self.fail(err);
                return 0;
            }
        }
        self.freq_buf[self.pos_in_block]
    }

    /// Advances to the next posting.
    pub fn next(&mut self) {
        if self.exhausted {
            return;
        }
        self.pos_in_block += 1;
        if self.pos_in_block == self.cur_block_len {
            if self.cur_block + 1 == self.blocks {
                self.set_exhausted();
            } else if let Err(err) = self.load_block(self.cur_block + 1) {
                self.fail(err);
            }
        } else {
            self.cur_docid = self.doc_buf[self.pos_in_block];
        }
    }

    /// Advances to the first posting with docid at least `target`.
    pub fn next_geq(&mut self, target: DocId) {
        if self.exhausted || target <= self.cur_docid {
            return;
        }
        if self.blocks > 1 && target > self.block_max(self.cur_block) {
            let mut b = self.cur_block + 1;
            while b < self.blocks && self.block_max(b) < target {
                b += 1;
            }
            if b == self.blocks {
                self.set_exhausted();
                return;
            }
            if let Err(err) = self.load_block(b) {
                self.fail(err);
                return;
            }
        }
        while self.pos_in_block < self.cur_block_len && self.doc_buf[self.pos_in_block] < target {
            self.pos_in_block += 1;
        }
        if self.pos_in_block == self.cur_block_len {
            self.set_exhausted();
        } else {
            self.cur_docid = self.doc_buf[self.pos_in_block];
        }
    }

    /// Moves the cursor to the `i`-th posting of the list.
    pub fn move_to_position(&mut self, i: u64) {
        debug_assert!(i < self.n);
        let b = i as usize / self.block_size;
        if self.exhausted || b != self.cur_block {
            if let Err(err) = self.load_block(b) {
                self.fail(err);
                return;
            }
        }
        self.pos_in_block = i as usize % self.block_size;
        self.cur_docid = self.doc_buf[self.pos_in_block];
    }

    fn block_len(&self, b: usize) -> usize {
        if b + 1 == self.blocks {
            self.n as usize - b * self.block_size
        } else {
            self.block_size
        }
    }

    fn block_max(&self, b: usize) -> DocId {
        LittleEndian::read_u32(&self.skip[4 * b..])
    }

    fn block_end_offset(&self, b: usize) -> usize {
        if self.blocks == 1 {
            self.data.len() - self.blocks_start
        } else {
            LittleEndian::read_u32(&self.skip[4 * (self.blocks + b)..]) as usize
        }
    }

    fn block_start_offset(&self, b: usize) -> usize {
        if b == 0 {
            0
        } else {
            self.block_end_offset(b - 1)
        }
    }

    fn check_skip_table(&self) -> Result<()> {
        if self.blocks == 1 {
            return Ok(());
        }
        let region_len = self.data.len() - self.blocks_start;
        let mut prev_end = 0usize;
        let mut prev_max = 0;
        for b in 0..self.blocks {
            let end = self.block_end_offset(b);
            let max = self.block_max(b);
            if end <= prev_end || end > region_len {
                return Err(Error::Corrupted("skip table offsets out of order".into()));
            }
            if b > 0 && max <= prev_max {
                return Err(Error::Corrupted("skip table docids out of order".into()));
            }
            prev_end = end;
            prev_max = max;
        }
        Ok(())
    }

    fn load_block(&mut self, b: usize) -> Result<()> {
        let len = self.block_len(b);
        let start = self.blocks_start + self.block_start_offset(b);
        let end = self.blocks_start + self.block_end_offset(b);
        let bytes = self
            .data
            .get(start..end)
            .ok_or_else(|| Error::Corrupted("block out of bounds".into()))?;
        let base = if b == 0 { 0 } else { self.block_max(b - 1) };
        let universe = if self.blocks == 1 {
            self.sentinel
        } else {
            self.block_max(b) - base
        };

        self.doc_buf.resize(len, 0);
        let codec = self.codec;
        let consumed = codec.decode(bytes, universe, &mut self.doc_buf)?;

        let mut prev = base;
        for doc in self.doc_buf.iter_mut() {
            prev += *doc;
            *doc = prev;
        }

        self.cur_block = b;
        self.cur_block_len = len;
        self.cur_block_end = end;
        self.freq_offset = start + consumed;
        self.freqs_decoded = false;
        self.pos_in_block = 0;
        self.exhausted = false;
        self.cur_docid = self.doc_buf[0];
        Ok(())
    }

    fn decode_freqs(&mut self) -> Result<()> {
        let bytes = self
            .data
            .get(self.freq_offset..self.cur_block_end)
            .ok_or_else(|| Error::Corrupted("frequency block out of bounds".into()))?;
        self.freq_buf.resize(self.cur_block_len, 0);
        let codec = self.codec;
        codec.decode(bytes, u32::MAX, &mut self.freq_buf)?;
        for freq in self.freq_buf.iter_mut() {
            *freq += 1;
        }
        self.freqs_decoded = true;
        Ok(())
    }

    fn set_exhausted(&mut self) {
        self.exhausted = true;
        self.cur_docid = self.sentinel;
    }

    // Corruption past the construction-time checks degrades the list to
    // its decoded prefix instead of poisoning the query.
    fn fail(&mut self, err: Error) {
        warn!("posting list decode failed: {err}");
        self.set_exhausted();
    }
}
