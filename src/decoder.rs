//! Zero-copy wire cursor with nested length limits
//!
//! Length-delimited values (strings, bytes, submessages) push a limit so the
//! parser cannot read past their declared size, and popping the limit checks
//! that the value consumed exactly what it declared.

use crate::error::{Error, Result};
use crate::varint;
use crate::wire::{self, WireType};

/// Cursor for reading wire data with position tracking
#[derive(Debug)]
pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    end: usize,
    limits: Vec<(usize, usize)>,
}

impl<'a> WireCursor<'a> {
    /// Create a cursor over the whole buffer
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            end: buf.len(),
            limits: Vec::new(),
        }
    }

    /// Bytes left under the current limit
    #[inline]
    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Check if cursor is at the current limit
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.end
    }

    /// Current read position from the start of the buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Nesting depth of active limits
    #[inline]
    pub fn depth(&self) -> usize {
        self.limits.len()
    }

    /// Restrict reads to the next `len` bytes
    pub fn push_limit(&mut self, len: usize) -> Result<()> {
        if len > self.remaining() {
            return Err(self.short(len));
        }
        self.limits.push((self.end, len));
        self.end = self.pos + len;
        Ok(())
    }

    /// Drop the innermost limit, checking it was consumed exactly
    pub fn pop_limit(&mut self) -> Result<()> {
        let Some((outer_end, declared)) = self.limits.pop() else {
            return Err(Error::ParsingFailed("limit stack underflow".into()));
        };
        if self.pos != self.end {
            let consumed = declared - (self.end - self.pos);
            self.end = outer_end;
            return Err(Error::SizeMismatch { declared, consumed });
        }
        self.end = outer_end;
        Ok(())
    }

    fn short(&self, needed: usize) -> Error {
        if self.end < self.buf.len() {
            Error::LimitExceeded {
                needed,
                remaining: self.remaining(),
            }
        } else {
            Error::UnexpectedEof
        }
    }

    /// Skip bytes in the cursor
    #[inline]
    pub fn skip(&mut self, n: usize) -> Result<()> {
        if n > self.remaining() {
            return Err(self.short(n));
        }
        self.pos += n;
        Ok(())
    }

    /// Read a single byte
    #[inline]
    pub fn get_u8(&mut self) -> Result<u8> {
        if self.is_at_end() {
            return Err(self.short(1));
        }
        let value = self.buf[self.pos];
        self.pos += 1;
        Ok(value)
    }

    /// Read a varint-encoded u64
    #[inline]
    pub fn get_varint(&mut self) -> Result<u64> {
        match varint::decode_u64(&self.buf[self.pos..self.end]) {
            Ok((value, len)) => {
                self.pos += len;
                Ok(value)
            }
            Err(Error::UnexpectedEof) => Err(self.short(self.remaining() + 1)),
            Err(e) => Err(e),
        }
    }

    /// Read a varint that must fit in a u32
    #[inline]
    pub fn get_varint_u32(&mut self) -> Result<u32> {
        let value = self.get_varint()?;
        u32::try_from(value).map_err(|_| Error::Overflow)
    }

    /// Read and split a field tag
    #[inline]
    pub fn get_tag(&mut self) -> Result<(u32, WireType)> {
        let tag = self.get_varint()?;
        wire::split_tag(tag)
    }

    /// Read four little-endian bytes
    #[inline]
    pub fn get_fixed32(&mut self) -> Result<u32> {
        let value = wire::decode_fixed32(&self.buf[self.pos..self.end]).map_err(|_| self.short(4))?;
        self.pos += 4;
        Ok(value)
    }

    /// Read eight little-endian bytes
    #[inline]
    pub fn get_fixed64(&mut self) -> Result<u64> {
        let value = wire::decode_fixed64(&self.buf[self.pos..self.end]).map_err(|_| self.short(8))?;
        self.pos += 8;
        Ok(value)
    }

    /// Read raw bytes without length prefix
    #[inline]
    pub fn get_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.short(len));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Read variable-length bytes with length prefix
    ///
    /// Returns a zero-copy slice into the original buffer
    #[inline]
    pub fn get_length_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.get_varint()?;
        let len = usize::try_from(len).map_err(|_| Error::Overflow)?;
        self.get_bytes(len)
    }

    /// Read a length prefix and push it as a limit
    pub fn enter_length_delimited(&mut self) -> Result<usize> {
        let len = self.get_varint()?;
        let len = usize::try_from(len).map_err(|_| Error::Overflow)?;
        self.push_limit(len)?;
        Ok(len)
    }

    /// Skip one field value of the given wire type
    pub fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => self.get_varint().map(|_| ()),
            WireType::Fixed32 => self.skip(4),
            WireType::Fixed64 => self.skip(8),
            WireType::LengthDelimited => self.get_length_delimited().map(|_| ()),
        }
    }

    /// Peek at bytes without advancing cursor
    #[inline]
    pub fn peek_bytes(&self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.short(len));
        }
        Ok(&self.buf[self.pos..self.pos + len])
    }
}
