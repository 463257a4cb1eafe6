//! Frame layouts for both protocol generations
//!
//! STP/1:
//!
//! ```text
//! +-------+---------+------------------+------+------------------------------+
//! | "STP" | ver u8  | body len varint  | type | (tag varint, value)*         |
//! +-------+---------+------------------+------+------------------------------+
//! ```
//!
//! STP/0 is UTF-16BE text, `"<byte len> <service> <data>"`, where the byte
//! length counts the UTF-16 bytes of `"<service> <data>"`. The data may carry
//! a tunneled STP/1 message as `"STP/1 <header len> <json header><payload>"`
//! with the header length in UTF-16 code units.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::buffer::ByteBuffer;
use crate::codec::{binary, json, PayloadFormat};
use crate::error::{Error, Result};
use crate::transport::{ProtocolVersion, StpHeader, TransportMessage};
use crate::varint;
use crate::wire::{self, WireType};
use crate::{FIELD_PAYLOAD, STP_MAGIC, STP_VERSION};

/// Prefix of a tunneled STP/1 message inside STP/0 data
pub const TUNNEL_PREFIX: &str = "STP/";

/// STP/1 prefix leg: magic, version and body length
pub fn encode_prefix(body_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(STP_MAGIC.len() + 1 + varint::MAX_VARINT_U64_SIZE);
    out.extend_from_slice(STP_MAGIC);
    out.push(STP_VERSION);
    varint::push_u64(body_len as u64, &mut out);
    out
}

/// STP/1 header leg: type byte, routing fields and the payload length prefix
///
/// The payload bytes themselves follow as separate legs.
pub fn encode_header(message: &TransportMessage) -> Result<Vec<u8>> {
    let header = StpHeader::from_message(message, false)?;
    let fields = binary::encode(&header)?;
    let payload_len = message.payload.len() as u64;

    let mut out = Vec::new();
    out.try_reserve_exact(
        1 + fields.len() + varint::MAX_VARINT_U32_SIZE + varint::MAX_VARINT_U64_SIZE,
    )?;
    out.push(message.kind.as_u8());
    out.extend_from_slice(&fields);
    varint::push_u64(
        wire::make_tag(FIELD_PAYLOAD, WireType::LengthDelimited),
        &mut out,
    );
    varint::push_u64(payload_len, &mut out);
    Ok(out)
}

/// Complete STP/1 frame in one buffer
pub fn encode_stp1(message: &TransportMessage) -> Result<Vec<u8>> {
    let header = encode_header(message)?;
    let body_len = header.len() + message.payload.len();
    let mut out = encode_prefix(body_len);
    out.try_reserve_exact(body_len)?;
    out.extend_from_slice(&header);
    for chunk in message.payload.chunks() {
        out.extend_from_slice(chunk);
    }
    Ok(out)
}

/// Complete STP/0 frame, tunneling messages that originated as STP/1
///
/// The service name ends at the first space of the frame, so names that
/// contain one are rejected. Plain STP/0 data carries no format and always
/// reads back as JSON, so other formats must go through the tunnel.
pub fn encode_stp0(message: &TransportMessage) -> Result<Vec<u8>> {
    if message.service_name.contains(' ') {
        return Err(Error::NotStp0Representable("service name contains a space"));
    }
    let data = match message.version {
        ProtocolVersion::Stp0 if message.format != PayloadFormat::Json => {
            return Err(Error::NotStp0Representable(
                "plain STP/0 payloads must be JSON",
            ));
        }
        ProtocolVersion::Stp0 => payload_text(message)?,
        ProtocolVersion::Stp1 => tunnel_data(message)?,
    };
    let body = format!("{} {}", message.service_name, data);
    let byte_len = body.encode_utf16().count() * 2;
    Ok(encode_utf16be(&format!("{byte_len} {body}")))
}

fn tunnel_data(message: &TransportMessage) -> Result<String> {
    let header = StpHeader::from_message(message, true)?;
    let header = String::from_utf8(json::encode(&header)?)?;
    let header_len = header.encode_utf16().count();
    let payload = payload_text(message)?;
    Ok(format!(
        "{TUNNEL_PREFIX}{STP_VERSION} {header_len} {header}{payload}"
    ))
}

/// Payload as STP/0 text: base64 for binary payloads, UTF-8 otherwise
fn payload_text(message: &TransportMessage) -> Result<String> {
    let bytes = message.payload.to_vec();
    match message.format {
        PayloadFormat::Binary => Ok(STANDARD.encode(bytes)),
        PayloadFormat::Json | PayloadFormat::Xml => Ok(String::from_utf8(bytes)?),
    }
}

/// Encode text as UTF-16 big-endian bytes
pub fn encode_utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Decode UTF-16 big-endian bytes
pub fn decode_utf16be(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::InvalidUtf16);
    }
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(|_| Error::InvalidUtf16)
}

/// Split off a space-terminated decimal number
fn split_number(text: &str) -> Result<(usize, &str)> {
    let Some((digits, rest)) = text.split_once(' ') else {
        return Err(Error::ParsingFailed("unterminated tunnel number".into()));
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::ParsingFailed(format!(
            "invalid tunnel number `{digits}`"
        )));
    }
    let value = digits.parse::<usize>().map_err(|_| Error::Overflow)?;
    Ok((value, rest))
}

/// Byte offset after the first `units` UTF-16 code units of `text`
fn utf16_offset(text: &str, units: usize) -> Result<usize> {
    let mut counted = 0;
    for (offset, c) in text.char_indices() {
        if counted == units {
            return Ok(offset);
        }
        counted += c.len_utf16();
    }
    if counted == units {
        return Ok(text.len());
    }
    Err(Error::ParsingFailed(format!(
        "tunnel header length {units} does not fit the data"
    )))
}

/// Build a message from the service and data of an STP/0 frame
pub fn parse_stp0_data(service_name: String, data: &str) -> Result<TransportMessage> {
    let Some(tunneled) = data.strip_prefix(TUNNEL_PREFIX) else {
        return Ok(TransportMessage {
            service_name,
            format: PayloadFormat::Json,
            payload: ByteBuffer::from(data),
            version: ProtocolVersion::Stp0,
            ..TransportMessage::default()
        });
    };

    let (version, rest) = split_number(tunneled)?;
    let version = u8::try_from(version).map_err(|_| Error::Overflow)?;
    if ProtocolVersion::from_u8(version)? != ProtocolVersion::Stp1 {
        return Err(Error::UnsupportedProtocolVersion(version));
    }
    let (header_len, rest) = split_number(rest)?;
    let split = utf16_offset(rest, header_len)?;
    let (header_text, payload) = rest.split_at(split);

    let mut header = StpHeader::default();
    json::decode(&mut header, header_text.as_bytes())?;

    let mut message = TransportMessage {
        version: ProtocolVersion::Stp1,
        ..TransportMessage::default()
    };
    header.apply_to(&mut message)?;
    message.payload = match message.format {
        PayloadFormat::Binary => ByteBuffer::from(STANDARD.decode(payload)?),
        PayloadFormat::Json | PayloadFormat::Xml => ByteBuffer::from(payload),
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MessageKind;

    #[test]
    fn test_stp1_layout() {
        let msg = TransportMessage::event("console", 3)
            .with_format(PayloadFormat::Json)
            .with_payload(&br#"[1,"hello"]"#[..]);
        let frame = encode_stp1(&msg).unwrap();

        let mut body = vec![2u8, 0x0A, 7];
        body.extend_from_slice(b"console");
        body.extend_from_slice(&[0x10, 3, 0x18, 1, 0x42, 11]);
        body.extend_from_slice(br#"[1,"hello"]"#);

        let mut expected = b"STP\x01".to_vec();
        expected.push(body.len() as u8);
        expected.extend_from_slice(&body);
        assert_eq!(frame, expected);
    }

    #[test]
    fn test_header_fields_by_kind() {
        let call = TransportMessage::call("s", 1, 9);
        let header = encode_header(&call).unwrap();
        // type, service, command, format, tag, payload
        assert_eq!(
            header,
            [0, 0x0A, 1, b's', 0x10, 1, 0x18, 0, 0x28, 9, 0x42, 0]
        );

        let failed = TransportMessage::error_for(&call, 500);
        let header = encode_header(&failed).unwrap();
        assert_eq!(&header[6..11], &[0x18, 0, 0x20, 0xF4, 0x03]);
    }

    #[test]
    fn test_utf16_round_trip() {
        let text = "12 svc caf\u{e9} \u{1F600}";
        let bytes = encode_utf16be(text);
        assert_eq!(&bytes[..4], &[0, b'1', 0, b'2']);
        assert_eq!(decode_utf16be(&bytes).unwrap(), text);
        assert_eq!(decode_utf16be(&[0xD8, 0x00]), Err(Error::InvalidUtf16));
        assert_eq!(decode_utf16be(&[0x00]), Err(Error::InvalidUtf16));
    }

    #[test]
    fn test_plain_stp0() {
        let msg = TransportMessage::event("console", 0)
            .with_format(PayloadFormat::Json)
            .with_version(ProtocolVersion::Stp0)
            .with_payload("[1]");
        let frame = encode_stp0(&msg).unwrap();
        // "console [1]" is 11 code units
        assert_eq!(decode_utf16be(&frame).unwrap(), "22 console [1]");

        let parsed = parse_stp0_data("console".into(), "[1]").unwrap();
        assert_eq!(parsed.kind, MessageKind::Event);
        assert_eq!(parsed.format, PayloadFormat::Json);
        assert_eq!(parsed.version, ProtocolVersion::Stp0);
        assert_eq!(parsed.payload.to_vec(), b"[1]");
    }

    #[test]
    fn test_stp0_rejects_unframeable() {
        let spaced = TransportMessage::event("my service", 0)
            .with_format(PayloadFormat::Json)
            .with_version(ProtocolVersion::Stp0)
            .with_payload("[1]");
        assert!(matches!(
            encode_stp0(&spaced),
            Err(Error::NotStp0Representable(_))
        ));
        let tunneled = spaced.clone().with_version(ProtocolVersion::Stp1);
        assert!(matches!(
            encode_stp0(&tunneled),
            Err(Error::NotStp0Representable(_))
        ));

        let binary = TransportMessage::event("console", 0)
            .with_format(PayloadFormat::Binary)
            .with_version(ProtocolVersion::Stp0)
            .with_payload(&[8u8, 1][..]);
        assert!(matches!(
            encode_stp0(&binary),
            Err(Error::NotStp0Representable(_))
        ));

        // the same payload keeps its format through the tunnel
        let binary = binary.with_version(ProtocolVersion::Stp1);
        let text = decode_utf16be(&encode_stp0(&binary).unwrap()).unwrap();
        let (_, body) = text.split_once(' ').unwrap();
        let (service, data) = body.split_once(' ').unwrap();
        let parsed = parse_stp0_data(service.into(), data).unwrap();
        assert_eq!(parsed.format, PayloadFormat::Binary);
        assert_eq!(parsed.payload.to_vec(), [8, 1]);
    }

    #[test]
    fn test_tunnel_round_trip() {
        let call = TransportMessage::call("ecmascript-debugger", 12, 77)
            .with_format(PayloadFormat::Binary)
            .with_payload(&[0x08u8, 0x96, 0x01][..]);
        let frame = encode_stp0(&call).unwrap();
        let text = decode_utf16be(&frame).unwrap();

        let (byte_len, body) = text.split_once(' ').unwrap();
        assert_eq!(byte_len.parse::<usize>().unwrap(), body.encode_utf16().count() * 2);
        let (service, data) = body.split_once(' ').unwrap();
        assert_eq!(
            data,
            r#"STP/1 38 ["ecmascript-debugger",12,0,null,77,0]CJYB"#
        );

        let parsed = parse_stp0_data(service.into(), data).unwrap();
        assert_eq!(parsed, call);
    }

    #[test]
    fn test_tunnel_errors() {
        assert!(parse_stp0_data("s".into(), "STP/9 2 []").is_err());
        assert!(matches!(
            parse_stp0_data("s".into(), "STP/1 99 [\"s\",1,1]"),
            Err(Error::ParsingFailed(_))
        ));
        assert!(matches!(
            parse_stp0_data("s".into(), "STP/x 1 ["),
            Err(Error::ParsingFailed(_))
        ));
    }
}
