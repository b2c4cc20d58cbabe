use sha2::{Digest, Sha256};

use crate::types::{Chunk, Payload};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Splits a payload into fixed-size chunks in byte order.
///
/// Every chunk except possibly the last is exactly `chunk_size` bytes, and
/// chunk offsets are contiguous from zero.
#[derive(Debug, Clone)]
pub struct ChunkPlan<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
    index: usize,
}

impl<'a> ChunkPlan<'a> {
    /// Plans chunks over `payload`.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (256 KiB) is used.
    pub fn new(payload: &'a Payload, chunk_size: usize) -> Result<Self, TransferError> {
        if payload.is_empty() {
            return Err(TransferError::EmptyPayload);
        }
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            data: payload.bytes(),
            chunk_size,
            offset: 0,
            index: 0,
        })
    }

    /// Chunk size in effect.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total number of chunks the payload splits into.
    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(self.chunk_size)
    }

    /// Total payload size in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Bytes not yet yielded.
    pub fn remaining(&self) -> u64 {
        (self.data.len() - self.offset) as u64
    }
}

impl<'a> Iterator for ChunkPlan<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = std::cmp::min(self.offset + self.chunk_size, self.data.len());
        let data = &self.data[self.offset..end];
        let chunk = Chunk {
            index: self.index,
            offset: self.offset as u64,
            data,
            checksum: checksum_bytes(data),
        };
        self.offset = end;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.data.len() - self.offset).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl ExactSizeIterator for ChunkPlan<'_> {}
