//! Protobuf-compatible wire primitives
//!
//! Field tags pack the field number and the wire type into one varint:
//! `(number << 3) | wire_type`. Fixed-width values are little-endian.

use crate::error::{Error, Result};

/// Largest field number a tag can carry
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Bit pattern every `f32` NaN is rewritten to before encoding
pub const CANONICAL_NAN_F32: u32 = 0x7FC0_0001;

/// Bit pattern every `f64` NaN is rewritten to before encoding
pub const CANONICAL_NAN_F64: u64 = 0x7FF8_0000_0000_0001;

/// How a value is laid out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    /// LEB128 varint
    Varint = 0,
    /// Eight little-endian bytes
    Fixed64 = 1,
    /// Varint length followed by that many bytes
    LengthDelimited = 2,
    /// Four little-endian bytes
    Fixed32 = 5,
}

impl WireType {
    /// Parse the low three bits of a tag
    #[inline]
    pub const fn from_bits(bits: u8) -> Result<Self> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(Error::InvalidWireType(other)),
        }
    }

    /// Raw value as stored in the tag
    #[inline]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Build a field tag
#[inline]
pub const fn make_tag(number: u32, wire_type: WireType) -> u64 {
    ((number as u64) << 3) | wire_type as u64
}

/// Split a decoded tag into field number and wire type
#[inline]
pub fn split_tag(tag: u64) -> Result<(u32, WireType)> {
    let wire_type = WireType::from_bits((tag & 0x07) as u8)?;
    let number = tag >> 3;
    if number == 0 || number > u64::from(MAX_FIELD_NUMBER) {
        return Err(Error::InvalidFieldNumber(number));
    }
    Ok((number as u32, wire_type))
}

/// Encode a u32 as four little-endian bytes
#[inline]
pub fn encode_fixed32(value: u32, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < 4 {
        return Err(Error::ShortBuffer);
    }
    buf[..4].copy_from_slice(&value.to_le_bytes());
    Ok(4)
}

/// Decode four little-endian bytes
#[inline]
pub fn decode_fixed32(buf: &[u8]) -> Result<u32> {
    if buf.len() < 4 {
        return Err(Error::UnexpectedEof);
    }
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Encode a u64 as eight little-endian bytes
#[inline]
pub fn encode_fixed64(value: u64, buf: &mut [u8]) -> Result<usize> {
    if buf.len() < 8 {
        return Err(Error::ShortBuffer);
    }
    buf[..8].copy_from_slice(&value.to_le_bytes());
    Ok(8)
}

/// Decode eight little-endian bytes
#[inline]
pub fn decode_fixed64(buf: &[u8]) -> Result<u64> {
    if buf.len() < 8 {
        return Err(Error::UnexpectedEof);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    Ok(u64::from_le_bytes(bytes))
}

/// Bits of an `f32` with NaN canonicalized
#[inline]
pub fn canonical_f32(value: f32) -> u32 {
    if value.is_nan() {
        CANONICAL_NAN_F32
    } else {
        value.to_bits()
    }
}

/// Bits of an `f64` with NaN canonicalized
#[inline]
pub fn canonical_f64(value: f64) -> u64 {
    if value.is_nan() {
        CANONICAL_NAN_F64
    } else {
        value.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        let tag = make_tag(8, WireType::LengthDelimited);
        assert_eq!(tag, 0x42);
        assert_eq!(split_tag(tag).unwrap(), (8, WireType::LengthDelimited));

        let tag = make_tag(MAX_FIELD_NUMBER, WireType::Fixed32);
        assert_eq!(split_tag(tag).unwrap(), (MAX_FIELD_NUMBER, WireType::Fixed32));
    }

    #[test]
    fn test_tag_errors() {
        assert_eq!(split_tag(0x08 | 3), Err(Error::InvalidWireType(3)));
        assert_eq!(split_tag(0x02), Err(Error::InvalidFieldNumber(0)));
        assert!(split_tag(u64::from(MAX_FIELD_NUMBER + 1) << 3).is_err());
    }

    #[test]
    fn test_fixed_roundtrip() {
        let mut buf = [0u8; 8];
        encode_fixed32(0xDEAD_BEEF, &mut buf).unwrap();
        assert_eq!(buf[..4], [0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(decode_fixed32(&buf).unwrap(), 0xDEAD_BEEF);

        encode_fixed64(0x0102_0304_0506_0708, &mut buf).unwrap();
        assert_eq!(buf[0], 0x08);
        assert_eq!(decode_fixed64(&buf).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_fixed_short() {
        let mut buf = [0u8; 3];
        assert_eq!(encode_fixed32(1, &mut buf), Err(Error::ShortBuffer));
        assert_eq!(decode_fixed32(&buf), Err(Error::UnexpectedEof));
        assert_eq!(decode_fixed64(&[0u8; 7]), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_nan_canonicalization() {
        let odd_nan = f64::from_bits(0xFFF8_0000_DEAD_0000);
        assert!(odd_nan.is_nan());
        assert_eq!(canonical_f64(odd_nan), CANONICAL_NAN_F64);
        assert!(f64::from_bits(CANONICAL_NAN_F64).is_nan());

        let odd_nan32 = f32::from_bits(0xFFC1_2345);
        assert_eq!(canonical_f32(odd_nan32), CANONICAL_NAN_F32);
        assert!(f32::from_bits(CANONICAL_NAN_F32).is_nan());

        assert_eq!(canonical_f64(1.5), 1.5f64.to_bits());
        assert_eq!(canonical_f32(-0.0), (-0.0f32).to_bits());
    }
}
