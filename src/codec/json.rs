//! Positional JSON codec
//!
//! A message is a JSON array with one slot per declared field, in declaration
//! order. Absent optionals are `null`, repeated fields and submessages are
//! nested arrays and bytes are base64 strings. Trailing absent slots are left
//! out, so `[1,"hello"]` is a complete two-field message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Number, Value};

use crate::codec::{DecodeOptions, UnknownFields};
use crate::error::{Error, Result};
use crate::proxy::{mismatch, FieldMut, FieldRef, Message, MessageRef};
use crate::schema::{FieldDescriptor, FieldKind, Quantifier};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Encode `message` as compact JSON text
pub fn encode(message: &dyn Message) -> Result<Vec<u8>> {
    let value = to_value(message)?;
    serde_json::to_vec(&value).map_err(|e| Error::ParsingFailed(e.to_string()))
}

/// Decode JSON text into `message` with default options
pub fn decode(message: &mut dyn Message, data: &[u8]) -> Result<()> {
    decode_with(message, data, &DecodeOptions::default())
}

/// Decode JSON text into `message`
pub fn decode_with(message: &mut dyn Message, data: &[u8], options: &DecodeOptions) -> Result<()> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| Error::malformed(e.column(), e.to_string()))?;
    from_value_with(message, &value, options)
}

/// Build the JSON tree for `message`
pub fn to_value(message: &dyn Message) -> Result<Value> {
    message_to_value(MessageRef::new(message))
}

/// Fill `message` from a JSON tree with default options
pub fn from_value(message: &mut dyn Message, value: &Value) -> Result<()> {
    from_value_with(message, value, &DecodeOptions::default())
}

/// Fill `message` from a JSON tree
pub fn from_value_with(message: &mut dyn Message, value: &Value, options: &DecodeOptions) -> Result<()> {
    value_to_message(message, value, options, 0)
}

fn float_value(value: f64) -> Value {
    if value.is_nan() {
        Value::String(NAN.into())
    } else if value.is_infinite() {
        let text = if value > 0.0 { INFINITY } else { NEG_INFINITY };
        Value::String(text.into())
    } else {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

fn single_value(field: &FieldDescriptor, value: FieldRef<'_>) -> Result<Value> {
    let json = match value {
        FieldRef::I32(v) => Value::from(v),
        FieldRef::I64(v) => Value::from(v),
        FieldRef::U32(v) => Value::from(v),
        FieldRef::U64(v) => Value::from(v),
        FieldRef::Bool(v) => Value::Bool(v),
        FieldRef::F32(v) => float_value(f64::from(v)),
        FieldRef::F64(v) => float_value(v),
        FieldRef::Str(s) => Value::String(s.to_owned()),
        FieldRef::Bytes(b) => Value::String(STANDARD.encode(b)),
        FieldRef::Buffer(b) => Value::String(STANDARD.encode(b.to_vec())),
        FieldRef::Message(sub) => message_to_value(MessageRef::new(sub))?,
        FieldRef::Repeated(_) => return Err(mismatch(field)),
    };
    Ok(json)
}

fn message_to_value(msg: MessageRef<'_>) -> Result<Value> {
    let desc = msg.descriptor();
    let mut slots = Vec::with_capacity(desc.len());
    // slots up to here must be written
    let mut used = 0;

    for (index, field) in desc.fields().iter().enumerate() {
        let slot = match field.quantifier {
            Quantifier::Required => {
                used = index + 1;
                single_value(field, msg.get(index)?)?
            }
            Quantifier::Optional => {
                if msg.is_present(index)? {
                    used = index + 1;
                    single_value(field, msg.get(index)?)?
                } else {
                    Value::Null
                }
            }
            Quantifier::Repeated => {
                let list = msg.repeated(index)?;
                let mut items = Vec::with_capacity(list.len());
                for i in 0..list.len() {
                    let item = list.get(i).ok_or_else(|| mismatch(field))?;
                    items.push(single_value(field, item)?);
                }
                if !items.is_empty() {
                    used = index + 1;
                }
                Value::Array(items)
            }
        };
        slots.push(slot);
    }

    slots.truncate(used);
    Ok(Value::Array(slots))
}

fn json_i64(field: &FieldDescriptor, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(v),
            None if n.is_u64() => Err(Error::Overflow),
            None => Err(mismatch(field)),
        },
        _ => Err(mismatch(field)),
    }
}

fn json_u64(field: &FieldDescriptor, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => Ok(v),
            None if n.is_i64() => Err(Error::Overflow),
            None => Err(mismatch(field)),
        },
        _ => Err(mismatch(field)),
    }
}

fn json_f64(field: &FieldDescriptor, value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(field)),
        Value::String(s) => match s.as_str() {
            NAN => Ok(f64::NAN),
            INFINITY => Ok(f64::INFINITY),
            NEG_INFINITY => Ok(f64::NEG_INFINITY),
            _ => Err(mismatch(field)),
        },
        _ => Err(mismatch(field)),
    }
}

fn json_str<'v>(field: &FieldDescriptor, value: &'v Value) -> Result<&'v str> {
    value.as_str().ok_or_else(|| mismatch(field))
}

fn store_value(
    field: &FieldDescriptor,
    value: &Value,
    slot: FieldMut<'_>,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    match slot {
        FieldMut::I32(s) => {
            *s = i32::try_from(json_i64(field, value)?).map_err(|_| Error::Overflow)?;
        }
        FieldMut::I64(s) => *s = json_i64(field, value)?,
        FieldMut::U32(s) => {
            *s = u32::try_from(json_u64(field, value)?).map_err(|_| Error::Overflow)?;
        }
        FieldMut::U64(s) => *s = json_u64(field, value)?,
        FieldMut::Bool(s) => *s = value.as_bool().ok_or_else(|| mismatch(field))?,
        FieldMut::F32(s) => {
            let wide = json_f64(field, value)?;
            let narrow = wide as f32;
            if wide.is_finite() && !narrow.is_finite() {
                return Err(Error::Overflow);
            }
            *s = narrow;
        }
        FieldMut::F64(s) => *s = json_f64(field, value)?,
        FieldMut::Str(s) => {
            let text = json_str(field, value)?;
            s.clear();
            s.try_reserve(text.len())?;
            s.push_str(text);
        }
        FieldMut::Bytes(b) => {
            let decoded = STANDARD.decode(json_str(field, value)?)?;
            *b = decoded;
        }
        FieldMut::Buffer(b) => {
            let decoded = STANDARD.decode(json_str(field, value)?)?;
            b.clear();
            b.append(&decoded)?;
        }
        FieldMut::Message(sub) => value_to_message(sub, value, options, depth + 1)?,
        FieldMut::Repeated(_) => return Err(mismatch(field)),
    }
    Ok(())
}

fn value_to_message(
    message: &mut dyn Message,
    value: &Value,
    options: &DecodeOptions,
    depth: usize,
) -> Result<()> {
    options.check_depth(depth)?;
    let desc = message.descriptor();
    let Value::Array(slots) = value else {
        return Err(Error::TypeMismatch {
            field: desc.name(),
            expected: "array",
        });
    };

    if slots.len() > desc.len() && options.unknown_fields == UnknownFields::Reject {
        return Err(Error::FieldIndexOutOfRange {
            message: desc.name(),
            index: desc.len(),
        });
    }

    // Decoding replaces the previous contents, presence included.
    if let Some(bits) = message.presence_mut() {
        bits.clear_all();
    }

    for (index, field) in desc.fields().iter().enumerate() {
        let slot = slots.get(index).filter(|v| !v.is_null());
        let Some(slot) = slot else {
            if field.is_required() {
                return Err(Error::MissingRequiredField {
                    message: desc.name(),
                    field: field.name,
                });
            }
            if let Some(FieldMut::Repeated(list)) = message.field_mut(index) {
                list.clear();
            }
            continue;
        };

        let storage = message.field_mut(index).ok_or(Error::FieldIndexOutOfRange {
            message: desc.name(),
            index,
        })?;

        if field.is_repeated() {
            let (FieldMut::Repeated(list), Value::Array(items)) = (storage, slot) else {
                return Err(mismatch(field));
            };
            list.clear();
            for item in items {
                store_value(field, item, list.push_default(), options, depth)?;
            }
            continue;
        }

        if field.kind == FieldKind::Message && !slot.is_array() {
            return Err(mismatch(field));
        }
        store_value(field, slot, storage, options, depth)?;
        if field.is_optional() {
            let bits = message.presence_mut().ok_or(Error::TypeMismatch {
                field: field.name,
                expected: "presence bitmap",
            })?;
            bits.set(index)?;
        }
    }
    Ok(())
}
