//! Transport envelope
//!
//! A [`TransportMessage`] is what the reader delivers and the writer sends:
//! routing fields plus an encoded payload. [`StpHeader`] is the same routing
//! information as a schema message, used to encode STP/1 header fields with
//! the binary codec and the tunnel header with the JSON codec.

use std::sync::OnceLock;

use crate::bitmap::PresenceBitmap;
use crate::buffer::ByteBuffer;
use crate::codec::{self, DecodeOptions, PayloadFormat};
use crate::error::{Error, Result};
use crate::proxy::{FieldMut, FieldRef, Message};
use crate::schema::{FieldDescriptor, FieldKind, MessageDescriptor};
use crate::{
    FIELD_COMMAND, FIELD_FORMAT, FIELD_KIND, FIELD_SERVICE, FIELD_STATUS, FIELD_TAG,
};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageKind {
    /// Request expecting a response with the same tag
    Call = 0,
    /// Reply to a call
    Response = 1,
    /// Unsolicited notification
    #[default]
    Event = 2,
    /// Failed call, carries a status
    Error = 3,
}

impl MessageKind {
    /// Parse the STP/1 type byte
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageKind::Call),
            1 => Some(MessageKind::Response),
            2 => Some(MessageKind::Event),
            3 => Some(MessageKind::Error),
            _ => None,
        }
    }

    /// STP/1 type byte
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Only errors carry a status
    #[inline]
    pub const fn has_status(self) -> bool {
        matches!(self, MessageKind::Error)
    }

    /// Everything but events carries a tag
    #[inline]
    pub const fn has_tag(self) -> bool {
        !matches!(self, MessageKind::Event)
    }
}

/// Framing generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Legacy UTF-16 text framing
    Stp0,
    /// Binary framing
    #[default]
    Stp1,
}

impl ProtocolVersion {
    /// Map a version number to a framing generation
    pub const fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ProtocolVersion::Stp0),
            1 => Ok(ProtocolVersion::Stp1),
            other => Err(Error::UnsupportedProtocolVersion(other)),
        }
    }

    /// Version number
    pub const fn as_u8(self) -> u8 {
        match self {
            ProtocolVersion::Stp0 => 0,
            ProtocolVersion::Stp1 => 1,
        }
    }
}

/// One framed message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportMessage {
    /// Service the message is addressed to or comes from
    pub service_name: String,
    /// Command within the service
    pub command_id: u32,
    /// Call, response, event or error
    pub kind: MessageKind,
    /// Error status, meaningful for `MessageKind::Error`
    pub status: u32,
    /// Pairs calls with responses
    pub tag: u32,
    /// Encoding of `payload`
    pub format: PayloadFormat,
    /// Encoded payload
    pub payload: ByteBuffer,
    /// Generation the message was framed with
    pub version: ProtocolVersion,
}

impl TransportMessage {
    /// Empty message of `kind` for `service` / `command_id`
    pub fn new(service_name: impl Into<String>, command_id: u32, kind: MessageKind) -> Self {
        Self {
            service_name: service_name.into(),
            command_id,
            kind,
            ..Self::default()
        }
    }

    /// Event message
    pub fn event(service_name: impl Into<String>, command_id: u32) -> Self {
        Self::new(service_name, command_id, MessageKind::Event)
    }

    /// Call message with `tag`
    pub fn call(service_name: impl Into<String>, command_id: u32, tag: u32) -> Self {
        Self::new(service_name, command_id, MessageKind::Call).with_tag(tag)
    }

    /// Response to `call`, same service, command and tag
    pub fn response_to(call: &TransportMessage) -> Self {
        Self::new(call.service_name.clone(), call.command_id, MessageKind::Response)
            .with_tag(call.tag)
            .with_format(call.format)
    }

    /// Error reply to `call` with `status`
    pub fn error_for(call: &TransportMessage, status: u32) -> Self {
        Self::new(call.service_name.clone(), call.command_id, MessageKind::Error)
            .with_tag(call.tag)
            .with_status(status)
            .with_format(call.format)
    }

    /// Set the tag
    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    /// Set the payload format
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the framing generation
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// Replace the payload with raw bytes
    pub fn with_payload(mut self, payload: impl Into<ByteBuffer>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Encode `message` in `self.format` as the payload
    pub fn set_message(&mut self, message: &dyn Message) -> Result<()> {
        let bytes = codec::encode(message, self.format)?;
        self.payload = ByteBuffer::from(bytes);
        Ok(())
    }

    /// Decode the payload into `message`
    pub fn parse_message(&self, message: &mut dyn Message) -> Result<()> {
        self.parse_message_with(message, &DecodeOptions::default())
    }

    /// Decode the payload into `message` with explicit options
    pub fn parse_message_with(&self, message: &mut dyn Message, options: &DecodeOptions) -> Result<()> {
        let bytes = self.payload.to_vec();
        codec::decode_with(message, self.format, &bytes, options)
    }
}

/// Routing fields as a schema message
///
/// STP/1 encodes fields 1 to 5; the tunnel header adds the kind as field 10,
/// giving the JSON form `[service, command, format, status, tag, kind]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StpHeader {
    /// Service name
    pub service: String,
    /// Command id
    pub command: u32,
    /// Payload format value
    pub format: u32,
    status: u32,
    tag: u32,
    kind: u32,
    presence: PresenceBitmap,
}

impl StpHeader {
    const STATUS: usize = 3;
    const TAG: usize = 4;
    const KIND: usize = 5;

    /// Schema of the header
    pub fn descriptor() -> &'static MessageDescriptor {
        static DESCRIPTOR: OnceLock<MessageDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            MessageDescriptor::new(
                "StpHeader",
                vec![
                    FieldDescriptor::required("service", FIELD_SERVICE, FieldKind::String),
                    FieldDescriptor::required("command", FIELD_COMMAND, FieldKind::Uint32),
                    FieldDescriptor::required("format", FIELD_FORMAT, FieldKind::Uint32),
                    FieldDescriptor::optional("status", FIELD_STATUS, FieldKind::Uint32),
                    FieldDescriptor::optional("tag", FIELD_TAG, FieldKind::Uint32),
                    FieldDescriptor::optional("kind", FIELD_KIND, FieldKind::Uint32),
                ],
            )
        })
    }

    /// Header fields of `message`; `with_kind` adds the tunnel-only kind
    pub fn from_message(message: &TransportMessage, with_kind: bool) -> Result<Self> {
        let mut header = Self {
            service: message.service_name.clone(),
            command: message.command_id,
            format: message.format.as_u64() as u32,
            ..Self::default()
        };
        if message.kind.has_status() {
            header.status = message.status;
            header.presence.set(Self::STATUS)?;
        }
        if message.kind.has_tag() {
            header.tag = message.tag;
            header.presence.set(Self::TAG)?;
        }
        if with_kind {
            header.kind = u32::from(message.kind.as_u8());
            header.presence.set(Self::KIND)?;
        }
        Ok(header)
    }

    /// Status, when the header carries one
    pub fn status(&self) -> Option<u32> {
        self.presence.is_set(Self::STATUS).then_some(self.status)
    }

    /// Tag, when the header carries one
    pub fn tag(&self) -> Option<u32> {
        self.presence.is_set(Self::TAG).then_some(self.tag)
    }

    /// Message kind; events when the header does not say
    pub fn kind(&self) -> Result<MessageKind> {
        if !self.presence.is_set(Self::KIND) {
            return Ok(MessageKind::Event);
        }
        u8::try_from(self.kind)
            .ok()
            .and_then(MessageKind::from_u8)
            .ok_or(Error::UnknownMessageType(self.kind.min(u32::from(u8::MAX)) as u8))
    }

    /// Copy the routing fields onto `message`
    pub fn apply_to(&self, message: &mut TransportMessage) -> Result<()> {
        message.service_name.clone_from(&self.service);
        message.command_id = self.command;
        message.format = PayloadFormat::from_u64(u64::from(self.format))?;
        message.kind = self.kind()?;
        message.status = self.status().unwrap_or(0);
        message.tag = self.tag().unwrap_or(0);
        Ok(())
    }
}

impl Default for StpHeader {
    fn default() -> Self {
        Self {
            service: String::new(),
            command: 0,
            format: 0,
            status: 0,
            tag: 0,
            kind: 0,
            presence: PresenceBitmap::new(Self::descriptor().len()),
        }
    }
}

impl Message for StpHeader {
    fn descriptor(&self) -> &'static MessageDescriptor {
        Self::descriptor()
    }

    fn field(&self, index: usize) -> Option<FieldRef<'_>> {
        Some(match index {
            0 => FieldRef::Str(&self.service),
            1 => FieldRef::U32(self.command),
            2 => FieldRef::U32(self.format),
            Self::STATUS => FieldRef::U32(self.status),
            Self::TAG => FieldRef::U32(self.tag),
            Self::KIND => FieldRef::U32(self.kind),
            _ => return None,
        })
    }

    fn field_mut(&mut self, index: usize) -> Option<FieldMut<'_>> {
        Some(match index {
            0 => FieldMut::Str(&mut self.service),
            1 => FieldMut::U32(&mut self.command),
            2 => FieldMut::U32(&mut self.format),
            Self::STATUS => FieldMut::U32(&mut self.status),
            Self::TAG => FieldMut::U32(&mut self.tag),
            Self::KIND => FieldMut::U32(&mut self.kind),
            _ => return None,
        })
    }

    fn presence(&self) -> Option<&PresenceBitmap> {
        Some(&self.presence)
    }

    fn presence_mut(&mut self) -> Option<&mut PresenceBitmap> {
        Some(&mut self.presence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json;
    use crate::messages::{commands, services, ConsoleMessage};

    #[test]
    fn test_kind_values() {
        assert_eq!(MessageKind::from_u8(3), Some(MessageKind::Error));
        assert_eq!(MessageKind::from_u8(4), None);
        assert!(MessageKind::Error.has_status());
        assert!(!MessageKind::Event.has_tag());
        assert_eq!(
            ProtocolVersion::from_u8(2),
            Err(Error::UnsupportedProtocolVersion(2))
        );
    }

    #[test]
    fn test_set_and_parse_message() {
        let console = ConsoleMessage::new(1, 42, "hello");
        let mut msg = TransportMessage::event(services::CONSOLE, commands::ON_CONSOLE_MESSAGE)
            .with_format(PayloadFormat::Json);
        msg.set_message(&console).unwrap();
        assert_eq!(msg.payload.to_vec(), br#"[1,42,"hello"]"#);

        let mut back = ConsoleMessage::default();
        msg.parse_message(&mut back).unwrap();
        assert_eq!(back, console);
    }

    #[test]
    fn test_header_optional_fields() {
        let call = TransportMessage::call("scope", 7, 99).with_format(PayloadFormat::Json);
        let header = StpHeader::from_message(&call, true).unwrap();
        assert_eq!(header.tag(), Some(99));
        assert_eq!(header.status(), None);
        assert_eq!(
            json::encode(&header).unwrap(),
            br#"["scope",7,1,null,99,0]"#
        );

        let event = TransportMessage::event("scope", 1);
        let header = StpHeader::from_message(&event, false).unwrap();
        assert_eq!(json::encode(&header).unwrap(), br#"["scope",1,0]"#);
    }

    #[test]
    fn test_header_apply() {
        let call = TransportMessage::call("window-manager", 3, 5);
        let failed = TransportMessage::error_for(&call, 404);
        let header = StpHeader::from_message(&failed, true).unwrap();

        let mut rebuilt = TransportMessage::default();
        header.apply_to(&mut rebuilt).unwrap();
        assert_eq!(rebuilt, failed);
    }
}
