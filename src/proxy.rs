//! Typed field access for any message
//!
//! A message type exposes its fields to the codecs through the [`Message`]
//! trait: for a declaration index it hands out a [`FieldRef`] or [`FieldMut`]
//! naming the Rust storage behind the field. [`MessageRef`] and
//! [`MessageMut`] pair an instance with its descriptor and add typed getters
//! and setters that check the field kind before touching anything.
//!
//! Storage per kind:
//!
//! | kinds                                    | storage                      |
//! |------------------------------------------|------------------------------|
//! | int32, sint32, sfixed32, enum            | `i32`                        |
//! | int64, sint64, sfixed64                  | `i64`                        |
//! | uint32, fixed32                          | `u32`                        |
//! | uint64, fixed64                          | `u64`                        |
//! | bool / float / double                    | `bool` / `f32` / `f64`       |
//! | string                                   | `String`                     |
//! | bytes                                    | `Vec<u8>` or [`ByteBuffer`]  |
//! | message                                  | any `Message`                |
//! | repeated of any of the above             | [`RepeatedField`]            |

use std::fmt;

use crate::bitmap::PresenceBitmap;
use crate::buffer::ByteBuffer;
use crate::error::{Error, Result};
use crate::schema::{FieldDescriptor, FieldKind, MessageDescriptor, Quantifier};

/// A structured message the codecs can read and write
pub trait Message: fmt::Debug {
    /// Schema of this message type
    fn descriptor(&self) -> &'static MessageDescriptor;

    /// Read access to the field at declaration index `index`
    fn field(&self, index: usize) -> Option<FieldRef<'_>>;

    /// Write access to the field at declaration index `index`
    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>>;

    /// Presence bitmap, for messages with Optional fields
    fn presence(&self) -> Option<&PresenceBitmap> {
        None
    }

    /// Mutable presence bitmap, for messages with Optional fields
    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        None
    }
}

/// Borrowed view of one field value
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
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
    Str(&'a str),
    /// bytes held contiguously
    Bytes(&'a [u8]),
    /// bytes held in chunks
    Buffer(&'a ByteBuffer),
    /// nested message
    Message(&'a dyn Message),
    /// repeated field
    Repeated(&'a dyn RepeatedField),
}

/// Mutable handle to one field's storage
#[derive(Debug)]
pub enum FieldMut<'a> {
    /// int32, sint32, sfixed32, enum
    I32(&'a mut i32),
    /// int64, sint64, sfixed64
    I64(&'a mut i64),
    /// uint32, fixed32
    U32(&'a mut u32),
    /// uint64, fixed64
    U64(&'a mut u64),
    /// bool
    Bool(&'a mut bool),
    /// float
    F32(&'a mut f32),
    /// double
    F64(&'a mut f64),
    /// string
    Str(&'a mut String),
    /// bytes held contiguously
    Bytes(&'a mut Vec<u8>),
    /// bytes held in chunks
    Buffer(&'a mut ByteBuffer),
    /// nested message
    Message(&'a mut dyn Message),
    /// repeated field
    Repeated(&'a mut dyn RepeatedField),
}

/// Storage of a repeated field
pub trait RepeatedField: fmt::Debug {
    /// Number of elements
    fn len(&self) -> usize;

    /// True when there are no elements
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`
    fn get(&self, index: usize) -> Option<FieldRef<'_>>;

    /// Append a default element and return a handle to it
    fn push_default(&mut self) -> FieldMut<'_>;

    /// Remove all elements
    fn clear(&mut self);
}

macro_rules! repeated_scalar {
    ($ty:ty, $variant:ident) => {
        impl RepeatedField for Vec<$ty> {
            fn len(&self) -> usize {
                Vec::len(self)
            }

            fn get(&self, index: usize) -> Option<FieldRef<'_>> {
                self.as_slice().get(index).map(|v| FieldRef::$variant(*v))
            }

            fn push_default(&mut self) -> FieldMut<'_> {
                let index = Vec::len(self);
                self.push(<$ty>::default());
                FieldMut::$variant(&mut self[index])
            }

            fn clear(&mut self) {
                Vec::clear(self)
            }
        }
    };
}

repeated_scalar!(i32, I32);
repeated_scalar!(i64, I64);
repeated_scalar!(u32, U32);
repeated_scalar!(u64, U64);
repeated_scalar!(bool, Bool);
repeated_scalar!(f32, F32);
repeated_scalar!(f64, F64);

impl RepeatedField for Vec<String> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<FieldRef<'_>> {
        self.as_slice().get(index).map(|v| FieldRef::Str(v))
    }

    fn push_default(&mut self) -> FieldMut<'_> {
        let index = Vec::len(self);
        self.push(String::new());
        FieldMut::Str(&mut self[index])
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }
}

impl RepeatedField for Vec<Vec<u8>> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<FieldRef<'_>> {
        self.as_slice().get(index).map(|v| FieldRef::Bytes(v))
    }

    fn push_default(&mut self) -> FieldMut<'_> {
        let index = Vec::len(self);
        self.push(Vec::new());
        FieldMut::Bytes(&mut self[index])
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }
}

impl<M: Message + Default> RepeatedField for Vec<M> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, index: usize) -> Option<FieldRef<'_>> {
        self.as_slice()
            .get(index)
            .map(|v| FieldRef::Message(v as &dyn Message))
    }

    fn push_default(&mut self) -> FieldMut<'_> {
        let index = Vec::len(self);
        self.push(M::default());
        FieldMut::Message(&mut self[index])
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }
}

impl FieldRef<'_> {
    /// Short name of the storage variant, for diagnostics
    pub const fn storage_name(&self) -> &'static str {
        match self {
            FieldRef::I32(_) => "i32",
            FieldRef::I64(_) => "i64",
            FieldRef::U32(_) => "u32",
            FieldRef::U64(_) => "u64",
            FieldRef::Bool(_) => "bool",
            FieldRef::F32(_) => "f32",
            FieldRef::F64(_) => "f64",
            FieldRef::Str(_) => "string",
            FieldRef::Bytes(_) | FieldRef::Buffer(_) => "bytes",
            FieldRef::Message(_) => "message",
            FieldRef::Repeated(_) => "repeated",
        }
    }
}

/// Check that a single-value storage variant matches a field kind
pub(crate) fn storage_matches(kind: FieldKind, value: &FieldRef<'_>) -> bool {
    matches!(
        (kind, value),
        (
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 | FieldKind::Enum,
            FieldRef::I32(_)
        ) | (
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64,
            FieldRef::I64(_)
        ) | (FieldKind::Uint32 | FieldKind::Fixed32, FieldRef::U32(_))
            | (FieldKind::Uint64 | FieldKind::Fixed64, FieldRef::U64(_))
            | (FieldKind::Bool, FieldRef::Bool(_))
            | (FieldKind::Float, FieldRef::F32(_))
            | (FieldKind::Double, FieldRef::F64(_))
            | (FieldKind::String, FieldRef::Str(_))
            | (FieldKind::Bytes, FieldRef::Bytes(_) | FieldRef::Buffer(_))
            | (FieldKind::Message, FieldRef::Message(_))
    )
}

pub(crate) fn mismatch(field: &FieldDescriptor) -> Error {
    Error::TypeMismatch {
        field: field.name,
        expected: field.kind.name(),
    }
}

/// Read-only proxy over a message instance
#[derive(Clone, Copy)]
pub struct MessageRef<'a> {
    message: &'a dyn Message,
    descriptor: &'static MessageDescriptor,
}

impl fmt::Debug for MessageRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRef")
            .field("message", &self.descriptor.name())
            .finish()
    }
}

impl<'a> MessageRef<'a> {
    /// Bind an instance to its descriptor
    pub fn new(message: &'a dyn Message) -> Self {
        Self {
            descriptor: message.descriptor(),
            message,
        }
    }

    /// Schema of the bound message
    #[inline]
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// The bound instance
    #[inline]
    pub fn message(&self) -> &'a dyn Message {
        self.message
    }

    /// Descriptor of the field at `index`
    pub fn field_descriptor(&self, index: usize) -> Result<&'static FieldDescriptor> {
        self.descriptor
            .field(index)
            .ok_or(Error::FieldIndexOutOfRange {
                message: self.descriptor.name(),
                index,
            })
    }

    /// Raw accessor for the field at `index`
    pub fn get(&self, index: usize) -> Result<FieldRef<'a>> {
        let field = self.field_descriptor(index)?;
        let value = self
            .message
            .field(index)
            .ok_or(Error::FieldIndexOutOfRange {
                message: self.descriptor.name(),
                index,
            })?;

        let ok = match (field.quantifier, &value) {
            (Quantifier::Repeated, FieldRef::Repeated(_)) => true,
            (Quantifier::Repeated, _) => false,
            (_, value) => storage_matches(field.kind, value),
        };
        if !ok {
            return Err(mismatch(field));
        }
        Ok(value)
    }

    /// Whether the field at `index` carries a value
    ///
    /// Required fields always do, Optional fields consult the presence
    /// bitmap and Repeated fields are present when non-empty.
    pub fn is_present(&self, index: usize) -> Result<bool> {
        let field = self.field_descriptor(index)?;
        match field.quantifier {
            Quantifier::Required => Ok(true),
            Quantifier::Optional => Ok(self
                .message
                .presence()
                .is_some_and(|bits| bits.is_set(index))),
            Quantifier::Repeated => Ok(!self.repeated(index)?.is_empty()),
        }
    }

    /// Repeated field storage
    pub fn repeated(&self, index: usize) -> Result<&'a dyn RepeatedField> {
        match self.get(index)? {
            FieldRef::Repeated(list) => Ok(list),
            _ => Err(mismatch(self.field_descriptor(index)?)),
        }
    }

    /// Number of items in a repeated field
    pub fn repeated_len(&self, index: usize) -> Result<usize> {
        Ok(self.repeated(index)?.len())
    }

    /// Nested message proxy
    pub fn get_message(&self, index: usize) -> Result<MessageRef<'a>> {
        match self.get(index)? {
            FieldRef::Message(message) => Ok(MessageRef::new(message)),
            _ => Err(mismatch(self.field_descriptor(index)?)),
        }
    }

    /// String value
    pub fn get_str(&self, index: usize) -> Result<&'a str> {
        match self.get(index)? {
            FieldRef::Str(value) => Ok(value),
            _ => Err(mismatch(self.field_descriptor(index)?)),
        }
    }

    /// Bytes value, copied out of whichever storage backs it
    pub fn get_bytes(&self, index: usize) -> Result<Vec<u8>> {
        match self.get(index)? {
            FieldRef::Bytes(value) => Ok(value.to_vec()),
            FieldRef::Buffer(value) => Ok(value.to_vec()),
            _ => Err(mismatch(self.field_descriptor(index)?)),
        }
    }
}

macro_rules! typed_getter {
    ($name:ident, $ty:ty, $variant:ident) => {
        impl<'a> MessageRef<'a> {
            #[doc = concat!("`", stringify!($ty), "` value")]
            pub fn $name(&self, index: usize) -> Result<$ty> {
                match self.get(index)? {
                    FieldRef::$variant(value) => Ok(value),
                    _ => Err(mismatch(self.field_descriptor(index)?)),
                }
            }
        }
    };
}

typed_getter!(get_i32, i32, I32);
typed_getter!(get_i64, i64, I64);
typed_getter!(get_u32, u32, U32);
typed_getter!(get_u64, u64, U64);
typed_getter!(get_bool, bool, Bool);
typed_getter!(get_f32, f32, F32);
typed_getter!(get_f64, f64, F64);

/// Mutable proxy over a message instance
pub struct MessageMut<'a> {
    message: &'a mut dyn Message,
    descriptor: &'static MessageDescriptor,
}

impl fmt::Debug for MessageMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageMut")
            .field("message", &self.descriptor.name())
            .finish()
    }
}

impl<'a> MessageMut<'a> {
    /// Bind an instance to its descriptor
    pub fn new(message: &'a mut dyn Message) -> Self {
        Self {
            descriptor: message.descriptor(),
            message,
        }
    }

    /// Schema of the bound message
    #[inline]
    pub fn descriptor(&self) -> &'static MessageDescriptor {
        self.descriptor
    }

    /// Read-only view
    pub fn view(&self) -> MessageRef<'_> {
        MessageRef::new(&*self.message)
    }

    /// Descriptor of the field at `index`
    pub fn field_descriptor(&self, index: usize) -> Result<&'static FieldDescriptor> {
        self.descriptor
            .field(index)
            .ok_or(Error::FieldIndexOutOfRange {
                message: self.descriptor.name(),
                index,
            })
    }

    /// Raw mutable accessor for the field at `index`
    pub fn get_mut(&mut self, index: usize) -> Result<FieldMut<'_>> {
        let field = self.field_descriptor(index)?;
        let name = self.descriptor.name();
        let value = self
            .message
            .field_mut(index)
            .ok_or(Error::FieldIndexOutOfRange {
                message: name,
                index,
            })?;

        let ok = match (field.quantifier, &value) {
            (Quantifier::Repeated, FieldMut::Repeated(_)) => true,
            (Quantifier::Repeated, _) => false,
            (_, value) => storage_matches_mut(field.kind, value),
        };
        if !ok {
            return Err(mismatch(field));
        }
        Ok(value)
    }

    /// Record that an Optional field now holds a value
    ///
    /// A no-op for Required and Repeated fields.
    pub fn mark_present(&mut self, index: usize) -> Result<()> {
        self.set_presence(index, true)
    }

    /// Record that an Optional field no longer holds a value
    pub fn clear_present(&mut self, index: usize) -> Result<()> {
        self.set_presence(index, false)
    }

    fn set_presence(&mut self, index: usize, present: bool) -> Result<()> {
        let field = self.field_descriptor(index)?;
        if !field.is_optional() {
            return Ok(());
        }
        let bits = self.message.presence_mut().ok_or(Error::TypeMismatch {
            field: field.name,
            expected: "presence bitmap",
        })?;
        if present {
            bits.set(index)
        } else {
            bits.clear(index)
        }
    }

    /// Repeated field storage
    pub fn repeated_mut(&mut self, index: usize) -> Result<&mut dyn RepeatedField> {
        let field = self.field_descriptor(index)?;
        match self.get_mut(index)? {
            FieldMut::Repeated(list) => Ok(list),
            _ => Err(mismatch(field)),
        }
    }

    /// Nested message proxy; marks an Optional field present
    pub fn message_mut(&mut self, index: usize) -> Result<MessageMut<'_>> {
        let field = self.field_descriptor(index)?;
        self.mark_present(index)?;
        match self.get_mut(index)? {
            FieldMut::Message(message) => Ok(MessageMut::new(message)),
            _ => Err(mismatch(field)),
        }
    }

    /// Set a string field
    pub fn set_str(&mut self, index: usize, value: &str) -> Result<()> {
        let field = self.field_descriptor(index)?;
        match self.get_mut(index)? {
            FieldMut::Str(slot) => {
                slot.clear();
                slot.push_str(value);
            }
            _ => return Err(mismatch(field)),
        }
        self.mark_present(index)
    }

    /// Set a bytes field, whichever storage backs it
    pub fn set_bytes(&mut self, index: usize, value: &[u8]) -> Result<()> {
        let field = self.field_descriptor(index)?;
        match self.get_mut(index)? {
            FieldMut::Bytes(slot) => {
                slot.clear();
                slot.extend_from_slice(value);
            }
            FieldMut::Buffer(slot) => {
                slot.clear();
                slot.append(value)?;
            }
            _ => return Err(mismatch(field)),
        }
        self.mark_present(index)
    }
}

fn storage_matches_mut(kind: FieldKind, value: &FieldMut<'_>) -> bool {
    matches!(
        (kind, value),
        (
            FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 | FieldKind::Enum,
            FieldMut::I32(_)
        ) | (
            FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64,
            FieldMut::I64(_)
        ) | (FieldKind::Uint32 | FieldKind::Fixed32, FieldMut::U32(_))
            | (FieldKind::Uint64 | FieldKind::Fixed64, FieldMut::U64(_))
            | (FieldKind::Bool, FieldMut::Bool(_))
            | (FieldKind::Float, FieldMut::F32(_))
            | (FieldKind::Double, FieldMut::F64(_))
            | (FieldKind::String, FieldMut::Str(_))
            | (FieldKind::Bytes, FieldMut::Bytes(_) | FieldMut::Buffer(_))
            | (FieldKind::Message, FieldMut::Message(_))
    )
}

macro_rules! typed_setter {
    ($name:ident, $ty:ty, $variant:ident) => {
        impl<'a> MessageMut<'a> {
            #[doc = concat!("Set a `", stringify!($ty), "` field and mark it present")]
            pub fn $name(&mut self, index: usize, value: $ty) -> Result<()> {
                let field = self.field_descriptor(index)?;
                match self.get_mut(index)? {
                    FieldMut::$variant(slot) => *slot = value,
                    _ => return Err(mismatch(field)),
                }
                self.mark_present(index)
            }
        }
    };
}

typed_setter!(set_i32, i32, I32);
typed_setter!(set_i64, i64, I64);
typed_setter!(set_u32, u32, U32);
typed_setter!(set_u64, u64, U64);
typed_setter!(set_bool, bool, Bool);
typed_setter!(set_f32, f32, F32);
typed_setter!(set_f64, f64, F64);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ConsoleMessage, WindowInfo, WindowList};

    #[test]
    fn test_typed_getters() {
        let mut msg = ConsoleMessage::new(7, 1_700_000_000_000, "boom");
        msg.set_line(42);

        let proxy = MessageRef::new(&msg);
        assert_eq!(proxy.get_u32(0).unwrap(), 7);
        assert_eq!(proxy.get_u64(1).unwrap(), 1_700_000_000_000);
        assert_eq!(proxy.get_str(2).unwrap(), "boom");
        assert!(proxy.is_present(4).unwrap());
        assert!(!proxy.is_present(3).unwrap());
    }

    #[test]
    fn test_type_mismatch_and_range() {
        let msg = ConsoleMessage::default();
        let proxy = MessageRef::new(&msg);

        assert!(matches!(
            proxy.get_str(0),
            Err(Error::TypeMismatch { field: "window_id", .. })
        ));
        assert!(matches!(
            proxy.get(99),
            Err(Error::FieldIndexOutOfRange { index: 99, .. })
        ));
    }

    #[test]
    fn test_setters_mark_presence() {
        let mut msg = ConsoleMessage::default();
        {
            let mut proxy = MessageMut::new(&mut msg);
            proxy.set_str(3, "https://example.com/").unwrap();
            proxy.set_u32(4, 0).unwrap();
            assert!(proxy.set_u64(4, 1).is_err());
        }
        assert_eq!(msg.uri(), Some("https://example.com/"));
        assert_eq!(msg.line(), Some(0));
    }

    #[test]
    fn test_repeated_access() {
        let mut list = WindowList::default();
        {
            let mut proxy = MessageMut::new(&mut list);
            let windows = proxy.repeated_mut(0).unwrap();
            match windows.push_default() {
                FieldMut::Message(window) => {
                    let mut window = MessageMut::new(window);
                    window.set_u32(0, 3).unwrap();
                    window.set_str(1, "Start page").unwrap();
                }
                other => panic!("unexpected storage {other:?}"),
            }
        }
        assert_eq!(list.windows.len(), 1);
        assert_eq!(list.windows[0], WindowInfo::new(3, "Start page"));

        let proxy = MessageRef::new(&list);
        assert!(proxy.is_present(0).unwrap());
        assert_eq!(proxy.repeated_len(0).unwrap(), 1);
    }
}
