//! Bounds-checked wire encoder over a caller-provided buffer
//!
//! The binary codec sizes its output up front, so the encoder never grows the
//! buffer; running out of space means the size pass and the write pass
//! disagree and is reported as `Error::ShortBuffer`.

use crate::error::{Error, Result};
use crate::varint;
use crate::wire::{self, WireType};

/// Wire encoder that writes into a user-provided buffer
pub struct WireEncoder<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> WireEncoder<'a> {
    /// Create new encoder with the given buffer
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Write a single byte
    #[inline]
    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        if self.pos >= self.buf.len() {
            return Err(Error::ShortBuffer);
        }
        self.buf[self.pos] = value;
        self.pos += 1;
        Ok(())
    }

    /// Write a field tag
    #[inline]
    pub fn put_tag(&mut self, number: u32, wire_type: WireType) -> Result<()> {
        self.put_varint(wire::make_tag(number, wire_type))
    }

    /// Write a varint-encoded u64
    #[inline]
    pub fn put_varint(&mut self, value: u64) -> Result<()> {
        let remaining = &mut self.buf[self.pos..];
        let varint_len = varint::encode_u64(value, remaining)?;
        self.pos += varint_len;
        Ok(())
    }

    /// Write a u32 as four little-endian bytes
    #[inline]
    pub fn put_fixed32(&mut self, value: u32) -> Result<()> {
        let written = wire::encode_fixed32(value, &mut self.buf[self.pos..])?;
        self.pos += written;
        Ok(())
    }

    /// Write a u64 as eight little-endian bytes
    #[inline]
    pub fn put_fixed64(&mut self, value: u64) -> Result<()> {
        let written = wire::encode_fixed64(value, &mut self.buf[self.pos..])?;
        self.pos += written;
        Ok(())
    }

    /// Write raw bytes without length prefix
    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.pos + bytes.len() > self.buf.len() {
            return Err(Error::ShortBuffer);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Write bytes with a varint length prefix
    #[inline]
    pub fn put_length_delimited(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_varint(bytes.len() as u64)?;
        self.put_bytes(bytes)
    }

    /// Get current position in buffer
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Get remaining buffer capacity
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reset encoder for reuse with the same buffer
    #[inline]
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Get a slice of the encoded data
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.pos]
    }
}
