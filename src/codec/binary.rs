//! Protobuf-compatible binary codec
//!
//! Encoding runs in two passes. The first computes the size of every
//! submessage once, in traversal order, into a [`SizeCache`]; the second
//! writes into a buffer allocated at the exact total size, taking each length
//! prefix from the cache instead of re-walking the subtree.

use tracing::warn;

use crate::bitmap::PresenceBitmap;
use crate::codec::{DecodeOptions, UnknownFields};
use crate::decoder::WireCursor;
use crate::encoder::WireEncoder;
use crate::error::{Error, Result};
use crate::proxy::{mismatch, FieldMut, FieldRef, Message, MessageRef};
use crate::schema::{FieldDescriptor, FieldKind, Quantifier};
use crate::varint;
use crate::wire::{self, WireType};

/// Submessage sizes in traversal order
#[derive(Debug, Default)]
pub struct SizeCache {
    sizes: Vec<usize>,
    next: usize,
}

impl SizeCache {
    fn reserve_slot(&mut self) -> Result<usize> {
        self.sizes.try_reserve(1)?;
        self.sizes.push(0);
        Ok(self.sizes.len() - 1)
    }

    fn take(&mut self) -> Result<usize> {
        let size = self
            .sizes
            .get(self.next)
            .copied()
            .ok_or_else(|| Error::ParsingFailed("size cache exhausted".into()))?;
        self.next += 1;
        Ok(size)
    }
}

/// Encode `message` into a freshly allocated buffer
pub fn encode(message: &dyn Message) -> Result<Vec<u8>> {
    let mut cache = SizeCache::default();
    let size = message_size(MessageRef::new(message), &mut cache)?;

    let mut out = Vec::new();
    out.try_reserve_exact(size)?;
    out.resize(size, 0);

    let mut enc = WireEncoder::new(&mut out);
    write_message(&mut enc, MessageRef::new(message), &mut cache)?;
    if enc.position() != size {
        return Err(Error::SizeMismatch {
            declared: size,
            consumed: enc.position(),
        });
    }
    Ok(out)
}

/// Encoded size of `message` without producing the bytes
pub fn encoded_len(message: &dyn Message) -> Result<usize> {
    message_size(MessageRef::new(message), &mut SizeCache::default())
}

/// Decode `data` into `message` with default options
pub fn decode(message: &mut dyn Message, data: &[u8]) -> Result<()> {
    decode_with(message, data, &DecodeOptions::default())
}

/// Decode `data` into `message`
///
/// Fields already set on `message` are overwritten as they appear; repeated
/// fields are appended to.
pub fn decode_with(message: &mut dyn Message, data: &[u8], options: &DecodeOptions) -> Result<()> {
    let mut cursor = WireCursor::new(data);
    decode_message(&mut cursor, message, options, 0)
}

/// Iterate the values of `index` that must go on the wire
fn for_each_value<'a>(
    msg: MessageRef<'a>,
    index: usize,
    mut f: impl FnMut(FieldRef<'a>) -> Result<()>,
) -> Result<()> {
    let field = msg.field_descriptor(index)?;
    match field.quantifier {
        Quantifier::Required => f(msg.get(index)?),
        Quantifier::Optional => {
            if msg.is_present(index)? {
                f(msg.get(index)?)?;
            }
            Ok(())
        }
        Quantifier::Repeated => {
            let list = msg.repeated(index)?;
            for i in 0..list.len() {
                let value = list.get(i).ok_or_else(|| mismatch(field))?;
                f(value)?;
            }
            Ok(())
        }
    }
}

/// Scalar value as the integer that goes on the wire
fn scalar_raw(field: &FieldDescriptor, value: FieldRef<'_>) -> Result<u64> {
    let raw = match (field.kind, value) {
        (FieldKind::Int32 | FieldKind::Enum, FieldRef::I32(v)) => i64::from(v) as u64,
        (FieldKind::Sint32, FieldRef::I32(v)) => u64::from(varint::zigzag_encode_32(v)),
        (FieldKind::Sfixed32, FieldRef::I32(v)) => u64::from(v as u32),
        (FieldKind::Int64 | FieldKind::Sfixed64, FieldRef::I64(v)) => v as u64,
        (FieldKind::Sint64, FieldRef::I64(v)) => varint::zigzag_encode_64(v),
        (FieldKind::Uint32 | FieldKind::Fixed32, FieldRef::U32(v)) => u64::from(v),
        (FieldKind::Uint64 | FieldKind::Fixed64, FieldRef::U64(v)) => v,
        (FieldKind::Bool, FieldRef::Bool(v)) => u64::from(v),
        (FieldKind::Float, FieldRef::F32(v)) => u64::from(wire::canonical_f32(v)),
        (FieldKind::Double, FieldRef::F64(v)) => wire::canonical_f64(v),
        _ => return Err(mismatch(field)),
    };
    Ok(raw)
}

fn value_size(field: &FieldDescriptor, value: FieldRef<'_>, cache: &mut SizeCache) -> Result<usize> {
    let len = match value {
        FieldRef::Str(s) => varint::encoded_len(s.len() as u64) + s.len(),
        FieldRef::Bytes(b) => varint::encoded_len(b.len() as u64) + b.len(),
        FieldRef::Buffer(b) => varint::encoded_len(b.len() as u64) + b.len(),
        FieldRef::Message(sub) => {
            let slot = cache.reserve_slot()?;
            let size = message_size(MessageRef::new(sub), cache)?;
            cache.sizes[slot] = size;
            varint::encoded_len(size as u64) + size
        }
        FieldRef::Repeated(_) => return Err(mismatch(field)),
        scalar => match field.wire_type() {
            WireType::Varint => varint::encoded_len(scalar_raw(field, scalar)?),
            WireType::Fixed32 => 4,
            WireType::Fixed64 => 8,
            WireType::LengthDelimited => return Err(mismatch(field)),
        },
    };
    Ok(len)
}

fn message_size(msg: MessageRef<'_>, cache: &mut SizeCache) -> Result<usize> {
    let desc = msg.descriptor();
    let mut total = 0usize;
    for (index, field) in desc.fields().iter().enumerate() {
        let tag_len = varint::encoded_len(wire::make_tag(field.number, field.wire_type()));
        for_each_value(msg, index, |value| {
            total += tag_len + value_size(field, value, cache)?;
            Ok(())
        })?;
    }
    Ok(total)
}

fn write_value(
    enc: &mut WireEncoder<'_>,
    field: &FieldDescriptor,
    value: FieldRef<'_>,
    cache: &mut SizeCache,
) -> Result<()> {
    enc.put_tag(field.number, field.wire_type())?;
    match value {
        FieldRef::Str(s) => enc.put_length_delimited(s.as_bytes()),
        FieldRef::Bytes(b) => enc.put_length_delimited(b),
        FieldRef::Buffer(b) => {
            enc.put_varint(b.len() as u64)?;
            for chunk in b.chunks() {
                enc.put_bytes(chunk)?;
            }
            Ok(())
        }
        FieldRef::Message(sub) => {
            let size = cache.take()?;
            enc.put_varint(size as u64)?;
            let start = enc.position();
            write_message(enc, MessageRef::new(sub), cache)?;
            let written = enc.position() - start;
            if written != size {
                return Err(Error::SizeMismatch {
                    declared: size,
                    consumed: written,
                });
            }
            Ok(())
        }
        FieldRef::Repeated(_) => Err(mismatch(field)),
        scalar => {
            let raw = scalar_raw(field, scalar)?;
            match field.wire_type() {
                WireType::Varint => enc.put_varint(raw),
                WireType::Fixed32 => enc.put_fixed32(raw as u32),
                WireType::Fixed64 => enc.put_fixed64(raw),
                WireType::LengthDelimited => Err(mismatch(field)),
            }
        }
    }
}

fn write_message(enc: &mut WireEncoder<'_>, msg: MessageRef<'_>, cache: &mut SizeCache) -> Result<()> {
    let desc = msg.descriptor();
    for (index, field) in desc.fields().iter().enumerate() {
        for_each_value(msg, index, |value| write_value(enc, field, value, cache))?;
    }
    Ok(())
}

fn read_raw(cursor: &mut WireCursor<'_>, wire_type: WireType) -> Result<u64> {
    match wire_type {
        WireType::Varint => cursor.get_varint(),
        WireType::Fixed32 => cursor.get_fixed32().map(u64::from),
        WireType::Fixed64 => cursor.get_fixed64(),
        WireType::LengthDelimited => Err(Error::InvalidWireType(wire_type.bits())),
    }
}

/// Store a raw wire integer into scalar storage
fn store_scalar(field: &FieldDescriptor, raw: u64, slot: FieldMut<'_>) -> Result<()> {
    match (field.kind, slot) {
        (FieldKind::Int32 | FieldKind::Enum, FieldMut::I32(s)) => {
            *s = i32::try_from(raw as i64).map_err(|_| Error::Overflow)?;
        }
        (FieldKind::Sint32, FieldMut::I32(s)) => {
            let raw = u32::try_from(raw).map_err(|_| Error::Overflow)?;
            *s = varint::zigzag_decode_32(raw);
        }
        (FieldKind::Sfixed32, FieldMut::I32(s)) => *s = raw as u32 as i32,
        (FieldKind::Int64 | FieldKind::Sfixed64, FieldMut::I64(s)) => *s = raw as i64,
        (FieldKind::Sint64, FieldMut::I64(s)) => *s = varint::zigzag_decode_64(raw),
        (FieldKind::Uint32 | FieldKind::Fixed32, FieldMut::U32(s)) => {
            *s = u32::try_from(raw).map_err(|_| Error::Overflow)?;
        }
        (FieldKind::Uint64 | FieldKind::Fixed64, FieldMut::U64(s)) => *s = raw,
        (FieldKind::Bool, FieldMut::Bool(s)) => *s = raw != 0,
        (FieldKind::Float, FieldMut::F32(s)) => *s = f32::from_bits(raw as u32),
        (FieldKind::Double, FieldMut::F64(s)) => *s = f64::from_bits(raw),
        _ => return Err(mismatch(field)),
    }
    Ok(())
}

fn read_value(
    cursor: &mut WireCursor<'_>,
    field: &FieldDescriptor,
    slot: FieldMut<'_>,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    match (field.kind, slot) {
        (FieldKind::String, FieldMut::Str(s)) => {
            let bytes = cursor.get_length_delimited()?;
            let text = std::str::from_utf8(bytes)?;
            s.clear();
            s.try_reserve(text.len())?;
            s.push_str(text);
        }
        (FieldKind::Bytes, FieldMut::Bytes(b)) => {
            let bytes = cursor.get_length_delimited()?;
            b.clear();
            b.try_reserve(bytes.len())?;
            b.extend_from_slice(bytes);
        }
        (FieldKind::Bytes, FieldMut::Buffer(b)) => {
            let bytes = cursor.get_length_delimited()?;
            b.clear();
            b.append(bytes)?;
        }
        (FieldKind::Message, FieldMut::Message(sub)) => {
            read_submessage(cursor, sub, options, depth + 1)?;
        }
        (FieldKind::String | FieldKind::Bytes | FieldKind::Message, _) => {
            return Err(mismatch(field))
        }
        (_, slot) => {
            let raw = read_raw(cursor, field.wire_type())?;
            store_scalar(field, raw, slot)?;
        }
    }
    Ok(())
}

/// Decode a length-prefixed submessage
///
/// A prefix larger than the enclosing data, or a field running past the
/// declared end, is a size mismatch between the prefix and the content.
fn read_submessage(
    cursor: &mut WireCursor<'_>,
    message: &mut dyn Message,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    let declared = usize::try_from(cursor.get_varint()?).map_err(|_| Error::Overflow)?;
    let available = cursor.remaining();
    if declared > available {
        return Err(Error::SizeMismatch {
            declared,
            consumed: available,
        });
    }
    cursor.push_limit(declared)?;
    let start = cursor.position();
    match decode_message(cursor, message, options, depth) {
        Ok(()) => cursor.pop_limit(),
        Err(Error::LimitExceeded { .. } | Error::UnexpectedEof) => Err(Error::SizeMismatch {
            declared,
            consumed: cursor.position() - start,
        }),
        Err(e) => Err(e),
    }
}

fn decode_message(
    cursor: &mut WireCursor<'_>,
    message: &mut dyn Message,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    options.check_depth(depth)?;
    let desc = message.descriptor();
    let mut seen = PresenceBitmap::new(desc.len());

    while !cursor.is_at_end() {
        let (number, wire_type) = cursor.get_tag()?;
        let Some(index) = desc.index_of_number(number) else {
            if options.unknown_fields == UnknownFields::Reject {
                return Err(Error::UnknownField {
                    message: desc.name(),
                    number,
                });
            }
            warn!(msg_type = desc.name(), number, "skipping unknown field");
            cursor.skip_field(wire_type)?;
            continue;
        };
        let field = &desc.fields()[index];

        if field.is_repeated()
            && field.kind.is_packable()
            && wire_type == WireType::LengthDelimited
        {
            read_packed(cursor, message, index, field)?;
            seen.set(index)?;
            continue;
        }

        if wire_type != field.wire_type() {
            return Err(Error::WireTypeMismatch {
                field: field.name,
                expected: field.wire_type().bits(),
                actual: wire_type.bits(),
            });
        }

        let slot = message
            .field_mut(index)
            .ok_or(Error::FieldIndexOutOfRange {
                message: desc.name(),
                index,
            })?;
        if field.is_repeated() {
            let FieldMut::Repeated(list) = slot else {
                return Err(mismatch(field));
            };
            read_value(cursor, field, list.push_default(), options, depth)?;
        } else {
            read_value(cursor, field, slot, options, depth)?;
            if field.is_optional() {
                let bits = message.presence_mut().ok_or(Error::TypeMismatch {
                    field: field.name,
                    expected: "presence bitmap",
                })?;
                bits.set(index)?;
            }
        }
        seen.set(index)?;
    }

    for (index, field) in desc.fields().iter().enumerate() {
        if field.is_required() && !seen.is_set(index) {
            return Err(Error::MissingRequiredField {
                message: desc.name(),
                field: field.name,
            });
        }
    }
    Ok(())
}

fn read_packed(
    cursor: &mut WireCursor<'_>,
    message: &mut dyn Message,
    index: usize,
    field: &FieldDescriptor,
) -> Result<()> {
    let Some(FieldMut::Repeated(list)) = message.field_mut(index) else {
        return Err(mismatch(field));
    };
    cursor.enter_length_delimited()?;
    while !cursor.is_at_end() {
        let raw = read_raw(cursor, field.wire_type())?;
        store_scalar(field, raw, list.push_default())?;
    }
    cursor.pop_limit()
}
