//! Schema-driven message without a Rust type
//!
//! [`DynamicMessage`] stores one [`DynamicValue`] per descriptor field, so a
//! tool can decode, inspect and re-encode messages for any schema it loads at
//! runtime. Nested messages are created on first access, which keeps
//! self-referencing schemas finite.

use std::cell::OnceCell;
use std::fmt;
use std::sync::OnceLock;

use crate::bitmap::PresenceBitmap;
use crate::proxy::{FieldMut, FieldRef, Message, RepeatedField};
use crate::schema::{DescriptorFn, FieldDescriptor, FieldKind, MessageDescriptor};

fn empty_descriptor() -> &'static MessageDescriptor {
    static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
    DESCRIPTOR.get_or_init(|| MessageDescriptor::new("Empty", Vec::new()))
}

/// Lazily created nested message
#[derive(Clone)]
pub struct MessageSlot {
    descriptor: &'static MessageDescriptor,
    message: Option<Box<DynamicMessage>>,
    /// Default instance handed out by shared reads of an unset slot
    empty: OnceCell<Box<DynamicMessage>>,
}

impl MessageSlot {
    fn new(descriptor: &'static MessageDescriptor) -> Self {
        Self {
            descriptor,
            message: None,
            empty: OnceCell::new(),
        }
    }

    fn get(&self) -> &DynamicMessage {
        match &self.message {
            Some(message) => message,
            None => self
                .empty
                .get_or_init(|| Box::new(DynamicMessage::new(self.descriptor))),
        }
    }

    fn get_mut(&mut self) -> &mut DynamicMessage {
        let descriptor = self.descriptor;
        self.message
            .get_or_insert_with(|| Box::new(DynamicMessage::new(descriptor)))
    }

    fn is_pristine(&self) -> bool {
        self.message.as_deref().map_or(true, DynamicMessage::is_pristine)
    }
}

impl PartialEq for MessageSlot {
    fn eq(&self, other: &Self) -> bool {
        if !std::ptr::eq(self.descriptor, other.descriptor) {
            return false;
        }
        match (self.message.as_deref(), other.message.as_deref()) {
            (Some(a), Some(b)) => a == b,
            (Some(m), None) | (None, Some(m)) => m.is_pristine(),
            (None, None) => true,
        }
    }
}

impl fmt::Debug for MessageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message.as_deref() {
            Some(message) => message.fmt(f),
            None => write!(f, "{} {{}}", self.descriptor.name()),
        }
    }
}

/// Value of one dynamic field
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    /// int32, sint32, sfixed32, enum
    I32(i32),
    /// int64, sint64, sfixed64
    I64(i64),
    /// uint32, fixed32
    U32(u32),
    /// uint64, fixed64
    U64(u64),
    /// bool
    Bool(bool),
    /// float
    F32(f32),
    /// double
    F64(f64),
    /// string
    Str(String),
    /// bytes
    Bytes(Vec<u8>),
    /// nested message
    Message(MessageSlot),
    /// repeated field
    List(DynamicList),
}

impl DynamicValue {
    /// Default single value for a field kind
    pub fn default_for(kind: FieldKind, nested: Option<DescriptorFn>) -> Self {
        match kind {
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 | FieldKind::Enum => {
                DynamicValue::I32(0)
            }
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => DynamicValue::I64(0),
            FieldKind::Uint32 | FieldKind::Fixed32 => DynamicValue::U32(0),
            FieldKind::Uint64 | FieldKind::Fixed64 => DynamicValue::U64(0),
            FieldKind::Bool => DynamicValue::Bool(false),
            FieldKind::Float => DynamicValue::F32(0.0),
            FieldKind::Double => DynamicValue::F64(0.0),
            FieldKind::String => DynamicValue::Str(String::new()),
            FieldKind::Bytes => DynamicValue::Bytes(Vec::new()),
            FieldKind::Message => {
                let descriptor = nested.map_or_else(empty_descriptor, |get| get());
                DynamicValue::Message(MessageSlot::new(descriptor))
            }
        }
    }

    /// Default storage for a whole field, list or single value
    pub fn default_for_field(field: &FieldDescriptor) -> Self {
        if field.is_repeated() {
            DynamicValue::List(DynamicList::new(field.kind, field.message))
        } else {
            Self::default_for(field.kind, field.message)
        }
    }

    fn as_field_ref(&self) -> FieldRef<'_> {
        match self {
            DynamicValue::I32(v) => FieldRef::I32(*v),
            DynamicValue::I64(v) => FieldRef::I64(*v),
            DynamicValue::U32(v) => FieldRef::U32(*v),
            DynamicValue::U64(v) => FieldRef::U64(*v),
            DynamicValue::Bool(v) => FieldRef::Bool(*v),
            DynamicValue::F32(v) => FieldRef::F32(*v),
            DynamicValue::F64(v) => FieldRef::F64(*v),
            DynamicValue::Str(v) => FieldRef::Str(v),
            DynamicValue::Bytes(v) => FieldRef::Bytes(v),
            DynamicValue::Message(slot) => FieldRef::Message(slot.get()),
            DynamicValue::List(list) => FieldRef::Repeated(list),
        }
    }

    fn as_field_mut(&mut self) -> FieldMut<'_> {
        match self {
            DynamicValue::I32(v) => FieldMut::I32(v),
            DynamicValue::I64(v) => FieldMut::I64(v),
            DynamicValue::U32(v) => FieldMut::U32(v),
            DynamicValue::U64(v) => FieldMut::U64(v),
            DynamicValue::Bool(v) => FieldMut::Bool(v),
            DynamicValue::F32(v) => FieldMut::F32(v),
            DynamicValue::F64(v) => FieldMut::F64(v),
            DynamicValue::Str(v) => FieldMut::Str(v),
            DynamicValue::Bytes(v) => FieldMut::Bytes(v),
            DynamicValue::Message(slot) => FieldMut::Message(slot.get_mut()),
            DynamicValue::List(list) => FieldMut::Repeated(list),
        }
    }

    fn is_pristine(&self) -> bool {
        match self {
            DynamicValue::I32(v) => *v == 0,
            DynamicValue::I64(v) => *v == 0,
            DynamicValue::U32(v) => *v == 0,
            DynamicValue::U64(v) => *v == 0,
            DynamicValue::Bool(v) => !*v,
            DynamicValue::F32(v) => v.to_bits() == 0,
            DynamicValue::F64(v) => v.to_bits() == 0,
            DynamicValue::Str(v) => v.is_empty(),
            DynamicValue::Bytes(v) => v.is_empty(),
            DynamicValue::Message(slot) => slot.is_pristine(),
            DynamicValue::List(list) => list.items.is_empty(),
        }
    }
}

/// Elements of a repeated dynamic field
#[derive(Debug, Clone)]
pub struct DynamicList {
    kind: FieldKind,
    nested: Option<DescriptorFn>,
    items: Vec<DynamicValue>,
}

impl DynamicList {
    fn new(kind: FieldKind, nested: Option<DescriptorFn>) -> Self {
        Self {
            kind,
            nested,
            items: Vec::new(),
        }
    }

    /// Elements in order
    pub fn items(&self) -> &[DynamicValue] {
        &self.items
    }
}

impl PartialEq for DynamicList {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.items == other.items
    }
}

impl RepeatedField for DynamicList {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn get(&self, index: usize) -> Option<FieldRef<'_>> {
        self.items.get(index).map(DynamicValue::as_field_ref)
    }

    fn push_default(&mut self) -> FieldMut<'_> {
        let index = self.items.len();
        self.items
            .push(DynamicValue::default_for(self.kind, self.nested));
        self.items[index].as_field_mut()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// Message whose layout comes entirely from its descriptor
#[derive(Clone)]
pub struct DynamicMessage {
    descriptor: &'static MessageDescriptor,
    values: Vec<DynamicValue>,
    presence: PresenceBitmap,
}

impl DynamicMessage {
    /// Fresh instance with every field at its default
    pub fn new(descriptor: &'static MessageDescriptor) -> Self {
        Self {
            descriptor,
            values: descriptor
                .fields()
                .iter()
                .map(DynamicValue::default_for_field)
                .collect(),
            presence: PresenceBitmap::new(descriptor.len()),
        }
    }

    /// Value of the field named `name`
    pub fn value(&self, name: &str) -> Option<&DynamicValue> {
        self.descriptor
            .index_of_name(name)
            .and_then(|index| self.values.get(index))
    }

    fn is_pristine(&self) -> bool {
        self.presence.is_empty() && self.values.iter().all(DynamicValue::is_pristine)
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.descriptor, other.descriptor)
            && self.presence == other.presence
            && self.values == other.values
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct(self.descriptor.name());
        for (field, value) in self.descriptor.fields().iter().zip(&self.values) {
            out.field(field.name, value);
        }
        out.finish()
    }
}

impl Message for DynamicMessage {
    fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    fn field(&self, index: usize) -> Option<FieldRef<'_>> {
        self.values.get(index).map(DynamicValue::as_field_ref)
    }

    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>> {
        self.values.get_mut(index).map(DynamicValue::as_field_mut)
    }

    fn presence(&self) -> Option<&PresenceBitmap> {
        Some(&self.presence)
    }

    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        Some(&mut self.presence)
    }
}
