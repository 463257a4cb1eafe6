//! Chunked, non-contiguous byte buffer
//!
//! Payloads are accumulated as they arrive off the stream and written out
//! chunk by chunk, so nothing ever requires the whole payload to sit in one
//! allocation.

use std::collections::VecDeque;
use std::fmt;

use bytes::{Buf, Bytes};

use crate::error::{Error, Result};

/// Growable byte buffer made of immutable chunks
#[derive(Clone, Default)]
pub struct ByteBuffer {
    chunks: VecDeque<Bytes>,
    len: usize,
}

impl ByteBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are stored
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks backing the buffer
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Borrow one chunk by index
    #[inline]
    pub fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).map(|c| c.as_ref())
    }

    /// Iterate over the chunks in order
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.chunks.iter().map(|c| c.as_ref())
    }

    /// Copy `data` into a new chunk
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut owned = Vec::new();
        owned.try_reserve_exact(data.len())?;
        owned.extend_from_slice(data);
        self.append_bytes(Bytes::from(owned))
    }

    /// Append an existing chunk without copying
    pub fn append_bytes(&mut self, chunk: Bytes) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.chunks.try_reserve(1)?;
        self.len += chunk.len();
        self.chunks.push_back(chunk);
        Ok(())
    }

    /// Drop `n` bytes from the front
    pub fn consume(&mut self, mut n: usize) -> Result<()> {
        if n > self.len {
            return Err(Error::UnexpectedEof);
        }
        self.len -= n;
        while n > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            if front.len() <= n {
                n -= front.len();
                self.chunks.pop_front();
            } else {
                front.advance(n);
                n = 0;
            }
        }
        Ok(())
    }

    /// Copy `len` bytes starting at `offset` into a contiguous vector
    pub fn extract(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let end = offset.checked_add(len).ok_or(Error::Overflow)?;
        if end > self.len {
            return Err(Error::UnexpectedEof);
        }
        let mut out = Vec::new();
        out.try_reserve_exact(len)?;
        let mut skip = offset;
        for chunk in &self.chunks {
            if out.len() == len {
                break;
            }
            if skip >= chunk.len() {
                skip -= chunk.len();
                continue;
            }
            let take = (chunk.len() - skip).min(len - out.len());
            out.extend_from_slice(&chunk[skip..skip + take]);
            skip = 0;
        }
        Ok(out)
    }

    /// Copy the whole buffer into a contiguous vector
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Remove all bytes
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.chunks.iter().flat_map(|c| c.iter().copied())
    }
}

impl PartialEq for ByteBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.bytes().eq(other.bytes())
    }
}

impl Eq for ByteBuffer {}

impl fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        let mut buffer = Self::new();
        if !data.is_empty() {
            buffer.len = data.len();
            buffer.chunks.push_back(Bytes::from(data));
        }
        buffer
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl From<&str> for ByteBuffer {
    fn from(data: &str) -> Self {
        Self::from(data.as_bytes().to_vec())
    }
}
