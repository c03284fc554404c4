//! Byte storage behind an index: an owned buffer or a file mapping.

use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::error::Result;

/// A contiguous byte range, either owned or borrowed from a mapping.
///
/// The mapped variant keeps the mapping alive for as long as the source
/// (or any clone of it) exists.
#[derive(Clone)]
pub enum MemorySource {
    Memory(Arc<Vec<u8>>),
    Mapped(Arc<Mmap>),
}

impl MemorySource {
    /// Wraps an in-memory buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::Memory(Arc::new(data))
    }

    /// Maps the file at `path`.
    pub fn mapped(path: &Path) -> Result<Self> {
        let file = File::options().read(true).open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self::Mapped(Arc::new(mmap)))
    }

    /// Reads the file at `path` fully into memory.
    pub fn in_memory(path: &Path) -> Result<Self> {
        Ok(Self::from_vec(std::fs::read(path)?))
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Memory(data) => data,
            Self::Mapped(mmap) => mmap,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-copy view of a byte range. The range must be in bounds.
    pub fn subspan(&self, range: Range<usize>) -> &[u8] {
        &self.as_slice()[range]
    }
}
