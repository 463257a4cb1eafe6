//! Variable-length integer encoding (LEB128) and ZigZag mapping
//!
//! Varints carry every integer field kind except the fixed-width ones, plus
//! field tags and length prefixes. ZigZag keeps small negative numbers short.

use crate::error::{Error, Result};

/// Longest varint for a u32
pub const MAX_VARINT_U32_SIZE: usize = 5;

/// Longest varint for a u64
pub const MAX_VARINT_U64_SIZE: usize = 10;

/// Write `value` as a varint into `buf`, returning the bytes used
#[inline]
pub fn encode_u32(value: u32, buf: &mut [u8]) -> Result<usize> {
    encode_u64(u64::from(value), buf)
}

/// Read a varint that must fit in 32 bits
///
/// Returns (value, bytes_consumed). Values above `u32::MAX` are rejected.
#[inline]
pub fn decode_u32(buf: &[u8]) -> Result<(u32, usize)> {
    let (value, len) = decode_u64(buf)?;
    let value = u32::try_from(value).map_err(|_| Error::Overflow)?;
    Ok((value, len))
}

/// Write `value` as a varint into `buf`, returning the bytes used
///
/// Fails with `Error::ShortBuffer` when `buf` ends first.
#[inline]
pub fn encode_u64(mut value: u64, buf: &mut [u8]) -> Result<usize> {
    for (i, slot) in buf.iter_mut().enumerate() {
        if value < 0x80 {
            *slot = value as u8;
            return Ok(i + 1);
        }
        *slot = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
    }
    Err(Error::ShortBuffer)
}

/// Append `value` as a varint to a growable buffer
#[inline]
pub fn push_u64(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push(value as u8 | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Read a varint from the front of `buf`
///
/// Returns (value, bytes_consumed). A tenth byte may only carry bit 63, so
/// longer or wider encodings fail with `Error::Overflow`; a buffer ending on a
/// continuation byte is `Error::UnexpectedEof`.
#[inline]
pub fn decode_u64(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().take(MAX_VARINT_U64_SIZE).enumerate() {
        if i == MAX_VARINT_U64_SIZE - 1 && byte > 0x01 {
            return Err(Error::Overflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(Error::UnexpectedEof)
}

/// Number of bytes `value` occupies as a varint
#[inline]
pub const fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// ZigZag-map a signed 32-bit value
#[inline]
pub const fn zigzag_encode_32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Inverse of [`zigzag_encode_32`]
#[inline]
pub const fn zigzag_decode_32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

/// ZigZag-map a signed 64-bit value
#[inline]
pub const fn zigzag_encode_64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [`zigzag_encode_64`]
#[inline]
pub const fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protobuf_vectors() {
        let cases: [(u64, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (150, &[0x96, 0x01]),
            (300, &[0xAC, 0x02]),
            (u32::MAX as u64, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
            (u64::MAX, &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        ];

        for (value, wire) in cases {
            let mut out = Vec::new();
            push_u64(value, &mut out);
            assert_eq!(out, wire, "push {value}");

            let mut buf = [0u8; MAX_VARINT_U64_SIZE];
            let written = encode_u64(value, &mut buf).unwrap();
            assert_eq!(&buf[..written], wire, "encode {value}");
            assert_eq!(encoded_len(value), wire.len());
            assert_eq!(decode_u64(wire).unwrap(), (value, wire.len()));
        }
    }

    #[test]
    fn test_boundaries_round_trip() {
        for value in [127u64, 128, 16383, 16384, (1 << 31) - 1, (1 << 63) - 1] {
            let mut buf = [0u8; MAX_VARINT_U64_SIZE];
            let written = encode_u64(value, &mut buf).unwrap();
            assert_eq!(decode_u64(&buf[..written]).unwrap(), (value, written));
        }
        for value in [0u32, 127, 128, i32::MAX as u32, u32::MAX] {
            let mut buf = [0u8; MAX_VARINT_U32_SIZE];
            let written = encode_u32(value, &mut buf).unwrap();
            assert_eq!(decode_u32(&buf[..written]).unwrap(), (value, written));
        }
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        assert_eq!(decode_u64(&[0x96, 0x01, 0xFF, 0xFF]).unwrap(), (150, 2));
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode_32(0), 0);
        assert_eq!(zigzag_encode_32(-1), 1);
        assert_eq!(zigzag_encode_32(1), 2);
        assert_eq!(zigzag_encode_32(-2), 3);
        assert_eq!(zigzag_encode_32(i32::MIN), u32::MAX);

        for v in [0i64, -1, 1, -64, 63, i64::MIN, i64::MAX, -1_000_000] {
            assert_eq!(zigzag_decode_64(zigzag_encode_64(v)), v);
        }
        for v in [0i32, -1, 1, i32::MIN, i32::MAX] {
            assert_eq!(zigzag_decode_32(zigzag_encode_32(v)), v);
        }
        assert_eq!(encoded_len(zigzag_encode_64(-3)), 1);
    }

    #[test]
    fn test_short_output() {
        let mut buf = [0u8; 2];
        assert_eq!(encode_u32(u32::MAX, &mut buf), Err(Error::ShortBuffer));
        assert_eq!(encode_u64(0, &mut []), Err(Error::ShortBuffer));
    }

    #[test]
    fn test_truncated_input() {
        assert_eq!(decode_u32(&[0x80]), Err(Error::UnexpectedEof));
        assert_eq!(decode_u64(&[]), Err(Error::UnexpectedEof));
    }

    #[test]
    fn test_overlong_rejected() {
        let mut eleven = vec![0xFFu8; 10];
        eleven.push(0x01);
        assert_eq!(decode_u64(&eleven), Err(Error::Overflow));

        // tenth byte may only contribute bit 63
        let mut ten = [0xFFu8; 10];
        ten[9] = 0x02;
        assert_eq!(decode_u64(&ten), Err(Error::Overflow));
        ten[9] = 0x81;
        assert_eq!(decode_u64(&ten), Err(Error::Overflow));
    }

    #[test]
    fn test_u32_overflow() {
        let mut out = Vec::new();
        push_u64(u64::from(u32::MAX) + 1, &mut out);
        assert_eq!(decode_u32(&out), Err(Error::Overflow));
    }
}
