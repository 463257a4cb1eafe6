//! Message schemas
//!
//! A [`MessageDescriptor`] describes one message type: its name and its
//! fields in declaration order. Descriptors are built once per type, usually
//! inside a `std::sync::OnceLock`, and never change afterwards. The codecs
//! walk descriptors and reach the data through [`crate::proxy::Message`], so a
//! single implementation serves every message type.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::wire::{WireType, MAX_FIELD_NUMBER};

/// Getter for a nested message descriptor
///
/// A function pointer rather than a reference so that recursive and mutually
/// recursive message types can name each other before either is built.
pub type DescriptorFn = fn() -> &'static MessageDescriptor;

/// Value kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Signed 32-bit, plain varint
    Int32,
    /// Signed 64-bit, plain varint
    Int64,
    /// Unsigned 32-bit varint
    Uint32,
    /// Unsigned 64-bit varint
    Uint64,
    /// Signed 32-bit, ZigZag varint
    Sint32,
    /// Signed 64-bit, ZigZag varint
    Sint64,
    /// Unsigned 32-bit, four bytes
    Fixed32,
    /// Unsigned 64-bit, eight bytes
    Fixed64,
    /// Signed 32-bit, four bytes
    Sfixed32,
    /// Signed 64-bit, eight bytes
    Sfixed64,
    /// Boolean varint
    Bool,
    /// Enumeration value, stored as i32
    Enum,
    /// IEEE-754 single precision
    Float,
    /// IEEE-754 double precision
    Double,
    /// UTF-8 text
    String,
    /// Opaque bytes
    Bytes,
    /// Nested message
    Message,
}

impl FieldKind {
    /// Wire type a single value of this kind uses
    pub const fn wire_type(self) -> WireType {
        match self {
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum => WireType::Varint,
            FieldKind::Fixed32 | FieldKind::Sfixed32 | FieldKind::Float => WireType::Fixed32,
            FieldKind::Fixed64 | FieldKind::Sfixed64 | FieldKind::Double => WireType::Fixed64,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message => {
                WireType::LengthDelimited
            }
        }
    }

    /// Scalar numeric kinds may be packed when repeated
    pub const fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldKind::String | FieldKind::Bytes | FieldKind::Message
        )
    }

    /// Lower-case name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Sint32 => "sint32",
            FieldKind::Sint64 => "sint64",
            FieldKind::Fixed32 => "fixed32",
            FieldKind::Fixed64 => "fixed64",
            FieldKind::Sfixed32 => "sfixed32",
            FieldKind::Sfixed64 => "sfixed64",
            FieldKind::Bool => "bool",
            FieldKind::Enum => "enum",
            FieldKind::Float => "float",
            FieldKind::Double => "double",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
            FieldKind::Message => "message",
        }
    }
}

/// How many values a field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    /// Exactly one value, always encoded
    Required,
    /// Zero or one value, tracked by the presence bitmap
    Optional,
    /// Any number of values
    Repeated,
}

/// One field of a message
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    /// Field name, used by the XML codec and in errors
    pub name: &'static str,
    /// Wire field number
    pub number: u32,
    /// Value kind
    pub kind: FieldKind,
    /// Cardinality
    pub quantifier: Quantifier,
    /// Descriptor of the nested type, for `FieldKind::Message` only
    pub message: Option<DescriptorFn>,
}

impl FieldDescriptor {
    /// Required field
    pub const fn required(name: &'static str, number: u32, kind: FieldKind) -> Self {
        Self {
            name,
            number,
            kind,
            quantifier: Quantifier::Required,
            message: None,
        }
    }

    /// Optional field
    pub const fn optional(name: &'static str, number: u32, kind: FieldKind) -> Self {
        Self {
            name,
            number,
            kind,
            quantifier: Quantifier::Optional,
            message: None,
        }
    }

    /// Repeated field
    pub const fn repeated(name: &'static str, number: u32, kind: FieldKind) -> Self {
        Self {
            name,
            number,
            kind,
            quantifier: Quantifier::Repeated,
            message: None,
        }
    }

    /// Attach the nested message descriptor
    pub const fn with_message(mut self, message: DescriptorFn) -> Self {
        self.message = Some(message);
        self
    }

    /// Resolve the nested descriptor
    pub fn message_descriptor(&self) -> Option<&'static MessageDescriptor> {
        self.message.map(|get| get())
    }

    /// Wire type of one value of this field
    #[inline]
    pub const fn wire_type(&self) -> WireType {
        self.kind.wire_type()
    }

    /// True for `Quantifier::Required`
    #[inline]
    pub const fn is_required(&self) -> bool {
        matches!(self.quantifier, Quantifier::Required)
    }

    /// True for `Quantifier::Optional`
    #[inline]
    pub const fn is_optional(&self) -> bool {
        matches!(self.quantifier, Quantifier::Optional)
    }

    /// True for `Quantifier::Repeated`
    #[inline]
    pub const fn is_repeated(&self) -> bool {
        matches!(self.quantifier, Quantifier::Repeated)
    }
}

/// Schema of one message type
#[derive(Debug)]
pub struct MessageDescriptor {
    name: &'static str,
    fields: Vec<FieldDescriptor>,
    by_number: Vec<(u32, usize)>,
    has_presence: bool,
}

impl MessageDescriptor {
    /// Build a descriptor from fields in declaration order
    pub fn new(name: &'static str, fields: Vec<FieldDescriptor>) -> Self {
        let mut by_number: Vec<(u32, usize)> = fields
            .iter()
            .enumerate()
            .map(|(index, field)| (field.number, index))
            .collect();
        by_number.sort_unstable();
        let has_presence = fields.iter().any(FieldDescriptor::is_optional);

        Self {
            name,
            fields,
            by_number,
            has_presence,
        }
    }

    /// Message name
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in declaration order
    #[inline]
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Field by declaration index
    #[inline]
    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    /// Number of fields
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for messages without fields
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether instances carry a presence bitmap
    ///
    /// Only messages with at least one Optional field need one.
    #[inline]
    pub fn has_presence(&self) -> bool {
        self.has_presence
    }

    /// Declaration index of the field with wire number `number`
    pub fn index_of_number(&self, number: u32) -> Option<usize> {
        self.by_number
            .binary_search_by_key(&number, |&(n, _)| n)
            .ok()
            .map(|pos| self.by_number[pos].1)
    }

    /// Declaration index of the field named `name`
    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Check the schema is internally consistent
    ///
    /// Nested descriptors are not followed, so recursive schemas validate
    /// one level at a time.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::InvalidSchema {
            message: self.name,
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("empty message name".into()));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(invalid(format!("field {} has no name", field.number)));
            }
            if !names.insert(field.name) {
                return Err(invalid(format!("duplicate field name `{}`", field.name)));
            }
            if field.number == 0 || field.number > MAX_FIELD_NUMBER {
                return Err(invalid(format!(
                    "field `{}` has invalid number {}",
                    field.name, field.number
                )));
            }
            match (field.kind, field.message.is_some()) {
                (FieldKind::Message, false) => {
                    return Err(invalid(format!(
                        "message field `{}` has no nested descriptor",
                        field.name
                    )))
                }
                (kind, true) if kind != FieldKind::Message => {
                    return Err(invalid(format!(
                        "{} field `{}` has a nested descriptor",
                        kind.name(),
                        field.name
                    )))
                }
                _ => {}
            }
        }

        for pair in self.by_number.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(invalid(format!("duplicate field number {}", pair[0].0)));
            }
        }

        Ok(())
    }
}
