//! Random-access container of block-compressed posting lists.
//!
//! File layout, all integers little-endian:
//!
//! ```text
//! [freeze flags: u64]            feature flags, currently zero
//! [global parameters]            Elias-Fano codec parameters
//! [size: u64]                    number of posting lists
//! [num_docs: u64]
//! [endpoints bit vector]         Elias-Fano directory of list offsets
//!                                plus a sentinel equal to the total
//!                                posting-bytes length
//! [posting bytes length: u64]
//! [posting bytes]                concatenated encoded lists
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use tempfile::TempDir;

use crate::base::DocId;
use crate::bits::elias_fano::{self, EliasFanoEnumerator, GlobalParameters};
use crate::bits::{BitVector, BitVectorBuilder};
use crate::codec::BlockCodec;
use crate::error::{Error, Result};
use crate::postings::{write_posting_list, DocumentEnumerator};
use crate::source::MemorySource;

/// An immutable index mapping list ids to posting-list cursors.
///
/// Freely shareable across threads; every cursor carries its own state.
pub struct BlockFreqIndex {
    params: GlobalParameters,
    size: usize,
    num_docs: u64,
    endpoints: BitVector,
    source: MemorySource,
    list_offset: usize,
    list_len: usize,
    codec: Arc<dyn BlockCodec>,
}

impl BlockFreqIndex {
    /// Interprets `source` as a serialized index.
    pub fn from_source(source: MemorySource, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        let bytes = source.as_slice();
        let mut header = bytes;

        let _freeze_flags = header
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Corrupted("truncated header".into()))?;
        let params = GlobalParameters::from_bytes(header)?;
        header = &header[GlobalParameters::BYTES..];
        let size = header
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Corrupted("truncated header".into()))? as usize;
        let num_docs = header
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Corrupted("truncated header".into()))?;

        let endpoints_offset = 8 + GlobalParameters::BYTES + 16;
        let (endpoints, endpoint_bytes) = BitVector::from_bytes(&bytes[endpoints_offset..])?;

        let mut tail = bytes
            .get(endpoints_offset + endpoint_bytes..)
            .ok_or_else(|| Error::Corrupted("truncated endpoint directory".into()))?;
        let list_len = tail
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::Corrupted("truncated header".into()))? as usize;
        let list_offset = endpoints_offset + endpoint_bytes + 8;

        if bytes.len() < list_offset + list_len {
            return Err(Error::Corrupted(format!(
                "file has {} bytes, layout needs {}",
                bytes.len(),
                list_offset + list_len
            )));
        }
        if endpoints.len() < elias_fano::bit_len(list_len as u64, size as u64 + 1) {
            return Err(Error::Corrupted("endpoint directory too short".into()));
        }

        let index = Self {
            params,
            size,
            num_docs,
            endpoints,
            source,
            list_offset,
            list_len,
            codec,
        };
        let sentinel = index.endpoints().move_to(size as u64).1;
        if sentinel != list_len as u64 {
            return Err(Error::Corrupted(format!(
                "endpoint sentinel {sentinel} does not match posting bytes length {list_len}"
            )));
        }
        debug!(
            "opened index: {} lists over {} documents ({} codec)",
            size,
            num_docs,
            index.codec.name()
        );
        Ok(index)
    }

    /// Maps the index file at `path`.
    pub fn open(path: &Path, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        Self::from_source(MemorySource::mapped(path)?, codec)
    }

    /// Reads the index file at `path` fully into memory.
    pub fn in_memory(path: &Path, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        Self::from_source(MemorySource::in_memory(path)?, codec)
    }

    /// Number of posting lists.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_docs(&self) -> u64 {
        self.num_docs
    }

    fn endpoints(&self) -> EliasFanoEnumerator<'_> {
        EliasFanoEnumerator::new(
            &self.endpoints,
            0,
            self.list_len as u64,
            self.size as u64 + 1,
            &self.params,
        )
    }

    fn list_range(&self, i: usize) -> (usize, usize) {
        let mut endpoints = self.endpoints();
        let start = endpoints.move_to(i as u64).1 as usize;
        let end = endpoints.move_to(i as u64 + 1).1 as usize;
        (self.list_offset + start, self.list_offset + end)
    }

    /// Opens a cursor over list `i`.
    pub fn list(&self, i: usize) -> Result<DocumentEnumerator<'_>> {
        assert!(i < self.size, "list {i} out of range for size {}", self.size);
        let (start, end) = self.list_range(i);
        DocumentEnumerator::new(
            self.source.subspan(start..end),
            self.codec.as_ref(),
            self.num_docs,
        )
    }

    /// Touches every byte of list `i` so its pages are resident.
    pub fn warmup(&self, i: usize) {
        assert!(i < self.size, "list {i} out of range for size {}", self.size);
        let (start, end) = self.list_range(i);
        let mut checksum = 0u8;
        for &byte in self.source.subspan(start..end) {
            checksum ^= byte;
        }
        std::hint::black_box(checksum);
    }
}

/// In-memory builder; the result is queryable without touching disk.
pub struct Builder {
    params: GlobalParameters,
    num_docs: u64,
    codec: Arc<dyn BlockCodec>,
    endpoints: Vec<u64>,
    lists: Vec<u8>,
}

impl Builder {
    pub fn new(num_docs: u64, params: GlobalParameters, codec: Arc<dyn BlockCodec>) -> Self {
        Self {
            params,
            num_docs,
            codec,
            endpoints: vec![0],
            lists: Vec::new(),
        }
    }

    /// Appends one posting list; lists are assigned consecutive ids.
    pub fn add_posting_list(&mut self, docs: &[DocId], freqs: &[u32]) -> Result<()> {
        write_posting_list(&mut self.lists, self.codec.as_ref(), docs, freqs)?;
        self.endpoints.push(self.lists.len() as u64);
        Ok(())
    }

    pub fn build(self) -> BlockFreqIndex {
        let list_len = self.lists.len();
        let mut builder = BitVectorBuilder::new();
        elias_fano::write(&mut builder, &self.endpoints, list_len as u64, &self.params);
        BlockFreqIndex {
            params: self.params,
            size: self.endpoints.len() - 1,
            num_docs: self.num_docs,
            endpoints: builder.build(),
            source: MemorySource::from_vec(self.lists),
            list_offset: 0,
            list_len,
            codec: self.codec,
        }
    }
}

/// Builder that spills posting bytes to a scratch file so arbitrarily
/// large indexes can be written with bounded memory.
pub struct StreamBuilder {
    params: GlobalParameters,
    num_docs: u64,
    codec: Arc<dyn BlockCodec>,
    endpoints: Vec<u64>,
    // Owns the spill file's directory for the lifetime of the build.
    _scratch: TempDir,
    spill: File,
    buffer: Vec<u8>,
    postings_bytes_written: u64,
}

impl StreamBuilder {
    const BUFFER_SIZE: usize = 1 << 30;

    pub fn new(num_docs: u64, params: GlobalParameters, codec: Arc<dyn BlockCodec>) -> Result<Self> {
        let scratch = TempDir::new()?;
        let spill = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(scratch.path().join("buffer"))?;
        Ok(Self {
            params,
            num_docs,
            codec,
            endpoints: vec![0],
            _scratch: scratch,
            spill,
            buffer: Vec::new(),
            postings_bytes_written: 0,
        })
    }

    pub fn add_posting_list(&mut self, docs: &[DocId], freqs: &[u32]) -> Result<()> {
        let old_len = self.buffer.len();
        write_posting_list(&mut self.buffer, self.codec.as_ref(), docs, freqs)?;
        self.postings_bytes_written += (self.buffer.len() - old_len) as u64;
        self.endpoints.push(self.postings_bytes_written);
        self.maybe_flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.spill.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.buffer.len() >= Self::BUFFER_SIZE {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the finished index to `path`.
    pub fn build(mut self, path: &Path) -> Result<()> {
        self.flush()?;
        let mut out = BufWriter::new(File::create(path)?);
        write_header(
            &mut out,
            &self.params,
            self.num_docs,
            &self.endpoints,
            self.postings_bytes_written,
        )?;
        copy_spill(&mut self.spill, &mut out)?;
        out.flush()?;
        info!(
            "wrote index with {} lists ({} posting bytes) to {}",
            self.endpoints.len() - 1,
            self.postings_bytes_written,
            path.display()
        );
        Ok(())
    }

    /// Concatenates several stream builders into one index file.
    ///
    /// All builders must agree on `num_docs` and global parameters.
    pub fn merge_into(builders: Vec<StreamBuilder>, path: &Path) -> Result<()> {
        let first = builders.first().ok_or(Error::MergeMismatch)?;
        if builders
            .iter()
            .any(|b| b.num_docs != first.num_docs || b.params != first.params)
        {
            return Err(Error::MergeMismatch);
        }

        let size: usize = builders.iter().map(|b| b.endpoints.len() - 1).sum();
        let mut endpoints = Vec::with_capacity(size + 1);
        endpoints.push(0);
        let mut shift = 0u64;
        for builder in &builders {
            endpoints.extend(builder.endpoints[1..].iter().map(|&end| end + shift));
            shift += builder.postings_bytes_written;
        }
        let total_bytes = shift;

        let num_docs = first.num_docs;
        let params = first.params;
        let mut out = BufWriter::new(File::create(path)?);
        write_header(&mut out, &params, num_docs, &endpoints, total_bytes)?;
        for mut builder in builders {
            builder.flush()?;
            copy_spill(&mut builder.spill, &mut out)?;
        }
        out.flush()?;
        info!(
            "merged {size} lists ({total_bytes} posting bytes) into {}",
            path.display()
        );
        Ok(())
    }
}

fn write_header<W: Write>(
    out: &mut W,
    params: &GlobalParameters,
    num_docs: u64,
    endpoints: &[u64],
    total_bytes: u64,
) -> Result<()> {
    out.write_u64::<LittleEndian>(0)?; // freeze flags
    params.write_to(out)?;
    out.write_u64::<LittleEndian>(endpoints.len() as u64 - 1)?;
    out.write_u64::<LittleEndian>(num_docs)?;

    let mut directory = BitVectorBuilder::new();
    elias_fano::write(&mut directory, endpoints, total_bytes, params);
    directory.build().write_to(out)?;

    out.write_u64::<LittleEndian>(total_bytes)?;
    Ok(())
}

fn copy_spill<W: Write>(spill: &mut File, out: &mut W) -> Result<()> {
    use std::io::{Seek, SeekFrom};
    spill.seek(SeekFrom::Start(0))?;
    std::io::copy(spill, out)?;
    Ok(())
}
