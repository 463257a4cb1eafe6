//! Incremental STP reader
//!
//! [`StpReader::on_data_ready`] takes whatever bytes the connection produced,
//! appends them to an internal buffer and drives the state machine as far as
//! the buffered input allows. A value is only consumed once it is complete,
//! so the reader resumes exactly where it stopped however the stream was
//! chunked. Every complete message goes to the [`MessageHandler`].
//!
//! Malformed framing moves the reader to [`ReaderState::Failed`]; the stream
//! cannot be resynchronised and the owner is expected to drop it.

use std::mem;

use tracing::{debug, error, trace, warn};

use crate::codec::PayloadFormat;
use crate::error::{Error, Result};
use crate::frame;
use crate::transport::{MessageKind, ProtocolVersion, TransportMessage};
use crate::varint;
use crate::wire::{self, WireType};
use crate::{
    DEFAULT_MAX_MESSAGE_SIZE, FIELD_COMMAND, FIELD_FORMAT, FIELD_PAYLOAD, FIELD_SERVICE,
    FIELD_STATUS, FIELD_TAG, STP_MAGIC, STP_VERSION,
};

/// Receiver of decoded messages
pub trait MessageHandler {
    /// A complete message arrived
    fn on_message(&mut self, message: TransportMessage);

    /// The reader failed and will not deliver anything else
    fn on_error(&mut self, error: &Error) {
        let _ = error;
    }
}

impl MessageHandler for Vec<TransportMessage> {
    fn on_message(&mut self, message: TransportMessage) {
        self.push(message);
    }
}

/// Outcome of feeding data to the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// All input consumed, nothing partial pending
    Idle,
    /// All input consumed in the middle of a message
    NotEnoughData,
}

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Framing generation to expect
    pub protocol_version: ProtocolVersion,
    /// Largest body accepted, in bytes
    pub max_message_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::Stp1,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl ReaderConfig {
    /// Set the framing generation
    pub fn with_protocol_version(mut self, protocol_version: ProtocolVersion) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    /// Set the body size limit
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}

/// Position inside the STP/1 header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// Next field tag
    Key,
    /// Service name length
    Service,
    /// Service name bytes
    ServiceString(usize),
    /// Command id
    Command,
    /// Payload format
    Format,
    /// Error status
    Status,
    /// Call tag
    Tag,
    /// Payload chunk length
    ChunkSize,
    /// Payload bytes still to come in this chunk
    ChunkData(usize),
}

/// Reader state
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderState {
    /// `"STP"` and the version byte
    Prefix,
    /// Body length
    MessageSize,
    /// Message type byte
    StpType,
    /// Header fields
    Field(FieldState),
    /// Message complete, about to be delivered
    MessageDone,
    /// Start of an STP/0 frame
    Stp0Message,
    /// STP/0 decimal byte length
    Stp0Size,
    /// STP/0 service name
    Stp0Init,
    /// STP/0 data
    Stp0Data,
    /// Skipping the rest of an unusable body
    IgnoreBody,
    /// Skipping an unknown field's value; `None` until its length is read
    IgnoreField(Option<usize>),
    /// Skipping an unknown varint field
    IgnoreVarint,
    /// Stream is unusable
    Failed(Error),
}

const SPACE: u16 = b' ' as u16;

/// Accumulated STP/0 frame parts
#[derive(Debug, Default)]
struct Stp0Progress {
    service: Vec<u16>,
    data: Vec<u8>,
}

/// Incremental STP reader
#[derive(Debug)]
pub struct StpReader<H> {
    config: ReaderConfig,
    handler: H,
    state: ReaderState,
    input: Vec<u8>,
    pos: usize,
    /// Body bytes left in the current message
    remaining: usize,
    skip_body: bool,
    current: TransportMessage,
    stp0: Stp0Progress,
}

impl<H: MessageHandler> StpReader<H> {
    /// Reader for STP/1 with default limits
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, ReaderConfig::default())
    }

    /// Reader with explicit settings
    pub fn with_config(handler: H, config: ReaderConfig) -> Self {
        Self {
            state: start_state(config.protocol_version),
            config,
            handler,
            input: Vec::new(),
            pos: 0,
            remaining: 0,
            skip_body: false,
            current: TransportMessage::default(),
            stp0: Stp0Progress::default(),
        }
    }

    /// Current state
    pub fn state(&self) -> &ReaderState {
        &self.state
    }

    /// Settings in effect
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The message handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the message handler
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Give the handler back
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.input.len() - self.pos
    }

    /// Switch framing generation
    ///
    /// Takes effect immediately between messages, otherwise once the current
    /// message is done.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.config.protocol_version = version;
        if self.at_boundary() {
            self.state = start_state(version);
        }
    }

    /// Drop all buffered input and partial state
    pub fn reset(&mut self) {
        self.input.clear();
        self.pos = 0;
        self.remaining = 0;
        self.skip_body = false;
        self.current = TransportMessage::default();
        self.stp0 = Stp0Progress::default();
        self.state = start_state(self.config.protocol_version);
        trace!("reader reset");
    }

    /// Feed bytes from the stream
    pub fn on_data_ready(&mut self, data: &[u8]) -> Result<ReadStatus> {
        if let ReaderState::Failed(err) = &self.state {
            return Err(err.clone());
        }

        if self.pos > 0 {
            self.input.drain(..self.pos);
            self.pos = 0;
        }
        self.input.try_reserve(data.len())?;
        self.input.extend_from_slice(data);

        match self.run() {
            Ok(()) if self.at_boundary() && self.buffered() == 0 => Ok(ReadStatus::Idle),
            Ok(()) => Ok(ReadStatus::NotEnoughData),
            Err(err) if !err.is_fatal() => Err(err),
            Err(err) => {
                error!(error = %err, "STP stream failed");
                self.state = ReaderState::Failed(err.clone());
                self.handler.on_error(&err);
                Err(err)
            }
        }
    }

    fn at_boundary(&self) -> bool {
        matches!(self.state, ReaderState::Prefix | ReaderState::Stp0Message)
    }

    fn set_state(&mut self, state: ReaderState) {
        trace!(from = ?self.state, to = ?state, "reader transition");
        self.state = state;
    }

    fn available(&self) -> &[u8] {
        &self.input[self.pos..]
    }

    /// Consume `n` body bytes, enforcing the body limit
    fn consume_body(&mut self, n: usize) -> Result<()> {
        if n > self.remaining {
            return Err(Error::LimitExceeded {
                needed: n,
                remaining: self.remaining,
            });
        }
        self.remaining -= n;
        self.pos += n;
        Ok(())
    }

    /// Read a complete varint inside the body, or nothing
    fn body_varint(&mut self) -> Result<Option<u64>> {
        let buffered = self.available().len();
        match varint::decode_u64(self.available()) {
            Ok((value, len)) => {
                self.consume_body(len)?;
                Ok(Some(value))
            }
            Err(Error::UnexpectedEof) if buffered >= self.remaining => {
                Err(Error::LimitExceeded {
                    needed: buffered + 1,
                    remaining: self.remaining,
                })
            }
            Err(Error::UnexpectedEof) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn body_u32(&mut self) -> Result<Option<u32>> {
        match self.body_varint()? {
            Some(value) => Ok(Some(u32::try_from(value).map_err(|_| Error::Overflow)?)),
            None => Ok(None),
        }
    }

    /// Run until input runs out
    fn run(&mut self) -> Result<()> {
        loop {
            let progressed = match self.state.clone() {
                ReaderState::Prefix => self.read_prefix()?,
                ReaderState::MessageSize => self.read_message_size()?,
                ReaderState::StpType => self.read_type()?,
                ReaderState::Field(field) => self.read_field(field)?,
                ReaderState::MessageDone => {
                    self.deliver();
                    true
                }
                ReaderState::Stp0Message => self.start_stp0(),
                ReaderState::Stp0Size => self.read_stp0_size()?,
                ReaderState::Stp0Init => self.read_stp0_service()?,
                ReaderState::Stp0Data => self.read_stp0_data()?,
                ReaderState::IgnoreBody => self.ignore_body(),
                ReaderState::IgnoreField(len) => self.ignore_field(len)?,
                ReaderState::IgnoreVarint => self.ignore_varint()?,
                ReaderState::Failed(err) => return Err(err),
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    fn read_prefix(&mut self) -> Result<bool> {
        let window = self.available();
        let check = window.len().min(STP_MAGIC.len());
        if window[..check] != STP_MAGIC[..check] {
            return Err(Error::ParsingFailed("invalid STP prefix".into()));
        }
        if window.len() <= STP_MAGIC.len() {
            return Ok(false);
        }

        let version = window[STP_MAGIC.len()];
        self.pos += STP_MAGIC.len() + 1;
        self.skip_body = version != STP_VERSION;
        if self.skip_body {
            warn!(version, "skipping message with unsupported STP version");
        }
        self.set_state(ReaderState::MessageSize);
        Ok(true)
    }

    fn read_message_size(&mut self) -> Result<bool> {
        let (size, len) = match varint::decode_u64(self.available()) {
            Ok(decoded) => decoded,
            Err(Error::UnexpectedEof) => return Ok(false),
            Err(err) => return Err(err),
        };
        let size = usize::try_from(size).map_err(|_| Error::Overflow)?;
        if size > self.config.max_message_size {
            return Err(Error::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }
        self.pos += len;
        self.remaining = size;
        self.current = TransportMessage::default();

        if self.skip_body {
            self.set_state(ReaderState::IgnoreBody);
        } else {
            self.set_state(ReaderState::StpType);
        }
        Ok(true)
    }

    fn read_type(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Err(Error::ParsingFailed("empty STP body".into()));
        }
        let Some(&byte) = self.available().first() else {
            return Ok(false);
        };
        self.consume_body(1)?;

        match MessageKind::from_u8(byte) {
            Some(kind) => {
                self.current.kind = kind;
                self.set_state(ReaderState::Field(FieldState::Key));
            }
            None => {
                warn!(message_type = byte, "skipping message with unknown type");
                self.set_state(ReaderState::IgnoreBody);
            }
        }
        Ok(true)
    }

    fn expect_wire_type(name: &'static str, expected: WireType, actual: WireType) -> Result<()> {
        if expected != actual {
            return Err(Error::WireTypeMismatch {
                field: name,
                expected: expected.bits(),
                actual: actual.bits(),
            });
        }
        Ok(())
    }

    fn read_key(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            self.set_state(ReaderState::MessageDone);
            return Ok(true);
        }
        let Some(tag) = self.body_varint()? else {
            return Ok(false);
        };
        let (number, wire_type) = wire::split_tag(tag)?;

        let next = match number {
            FIELD_SERVICE => {
                Self::expect_wire_type("service", WireType::LengthDelimited, wire_type)?;
                FieldState::Service
            }
            FIELD_COMMAND => {
                Self::expect_wire_type("command", WireType::Varint, wire_type)?;
                FieldState::Command
            }
            FIELD_FORMAT => {
                Self::expect_wire_type("format", WireType::Varint, wire_type)?;
                FieldState::Format
            }
            FIELD_STATUS => {
                Self::expect_wire_type("status", WireType::Varint, wire_type)?;
                FieldState::Status
            }
            FIELD_TAG => {
                Self::expect_wire_type("tag", WireType::Varint, wire_type)?;
                FieldState::Tag
            }
            FIELD_PAYLOAD => {
                Self::expect_wire_type("payload", WireType::LengthDelimited, wire_type)?;
                FieldState::ChunkSize
            }
            _ => {
                warn!(number, "skipping unknown STP header field");
                let skip = match wire_type {
                    WireType::Varint => ReaderState::IgnoreVarint,
                    WireType::Fixed32 => ReaderState::IgnoreField(Some(4)),
                    WireType::Fixed64 => ReaderState::IgnoreField(Some(8)),
                    WireType::LengthDelimited => ReaderState::IgnoreField(None),
                };
                self.set_state(skip);
                return Ok(true);
            }
        };
        self.set_state(ReaderState::Field(next));
        Ok(true)
    }

    fn read_field(&mut self, field: FieldState) -> Result<bool> {
        let key = ReaderState::Field(FieldState::Key);
        match field {
            FieldState::Key => return self.read_key(),
            FieldState::Service => {
                let Some(len) = self.body_varint()? else {
                    return Ok(false);
                };
                let len = usize::try_from(len).map_err(|_| Error::Overflow)?;
                if len > self.remaining {
                    return Err(Error::LimitExceeded {
                        needed: len,
                        remaining: self.remaining,
                    });
                }
                self.set_state(ReaderState::Field(FieldState::ServiceString(len)));
            }
            FieldState::ServiceString(len) => {
                if self.available().len() < len {
                    return Ok(false);
                }
                let name = std::str::from_utf8(&self.available()[..len])?.to_owned();
                self.consume_body(len)?;
                self.current.service_name = name;
                self.set_state(key);
            }
            FieldState::Command => {
                let Some(value) = self.body_u32()? else {
                    return Ok(false);
                };
                self.current.command_id = value;
                self.set_state(key);
            }
            FieldState::Format => {
                let Some(value) = self.body_varint()? else {
                    return Ok(false);
                };
                self.current.format = PayloadFormat::from_u64(value)?;
                self.set_state(key);
            }
            FieldState::Status => {
                let Some(value) = self.body_u32()? else {
                    return Ok(false);
                };
                self.current.status = value;
                self.set_state(key);
            }
            FieldState::Tag => {
                let Some(value) = self.body_u32()? else {
                    return Ok(false);
                };
                self.current.tag = value;
                self.set_state(key);
            }
            FieldState::ChunkSize => {
                let Some(len) = self.body_varint()? else {
                    return Ok(false);
                };
                let len = usize::try_from(len).map_err(|_| Error::Overflow)?;
                if len > self.remaining {
                    return Err(Error::LimitExceeded {
                        needed: len,
                        remaining: self.remaining,
                    });
                }
                let next = if len == 0 { FieldState::Key } else { FieldState::ChunkData(len) };
                self.set_state(ReaderState::Field(next));
            }
            FieldState::ChunkData(left) => {
                let take = left.min(self.available().len());
                if take == 0 {
                    return Ok(false);
                }
                let start = self.pos;
                self.current.payload.append(&self.input[start..start + take])?;
                self.consume_body(take)?;
                let left = left - take;
                let next = if left == 0 { FieldState::Key } else { FieldState::ChunkData(left) };
                self.state = ReaderState::Field(next);
            }
        }
        Ok(true)
    }

    fn deliver(&mut self) {
        let message = mem::take(&mut self.current);
        debug!(
            service = %message.service_name,
            command = message.command_id,
            kind = ?message.kind,
            tag = message.tag,
            payload_len = message.payload.len(),
            "STP message received"
        );
        self.handler.on_message(message);
        self.set_state(start_state(self.config.protocol_version));
    }

    fn ignore_body(&mut self) -> bool {
        if self.remaining == 0 {
            trace!("skipped message body");
            self.set_state(start_state(self.config.protocol_version));
            return true;
        }
        let take = self.remaining.min(self.available().len());
        if take == 0 {
            return false;
        }
        self.remaining -= take;
        self.pos += take;
        true
    }

    fn ignore_field(&mut self, len: Option<usize>) -> Result<bool> {
        let Some(left) = len else {
            let Some(len) = self.body_varint()? else {
                return Ok(false);
            };
            let len = usize::try_from(len).map_err(|_| Error::Overflow)?;
            self.set_state(ReaderState::IgnoreField(Some(len)));
            return Ok(true);
        };

        if left > self.remaining {
            return Err(Error::LimitExceeded {
                needed: left,
                remaining: self.remaining,
            });
        }
        if left == 0 {
            self.set_state(ReaderState::Field(FieldState::Key));
            return Ok(true);
        }
        let take = left.min(self.available().len());
        if take == 0 {
            return Ok(false);
        }
        self.consume_body(take)?;
        self.state = ReaderState::IgnoreField(Some(left - take));
        Ok(true)
    }

    fn ignore_varint(&mut self) -> Result<bool> {
        match self.body_varint()? {
            Some(_) => {
                self.set_state(ReaderState::Field(FieldState::Key));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn start_stp0(&mut self) -> bool {
        if self.available().is_empty() {
            return false;
        }
        self.stp0 = Stp0Progress::default();
        self.current = TransportMessage::default();
        self.remaining = 0;
        self.set_state(ReaderState::Stp0Size);
        true
    }

    /// Next UTF-16BE code unit, if both bytes are buffered
    fn peek_unit(&self) -> Option<u16> {
        match self.available() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    fn read_stp0_size(&mut self) -> Result<bool> {
        let Some(unit) = self.peek_unit() else {
            return Ok(false);
        };
        self.pos += 2;

        if unit == SPACE {
            if self.remaining % 2 != 0 {
                return Err(Error::ParsingFailed("odd STP/0 byte length".into()));
            }
            if self.remaining == 0 {
                return Err(Error::ParsingFailed("empty STP/0 message".into()));
            }
            self.set_state(ReaderState::Stp0Init);
            return Ok(true);
        }

        let digit = match char::from_u32(u32::from(unit)).and_then(|c| c.to_digit(10)) {
            Some(digit) => digit as usize,
            None => return Err(Error::ParsingFailed("invalid STP/0 length".into())),
        };
        self.remaining = self
            .remaining
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or(Error::Overflow)?;
        if self.remaining > self.config.max_message_size {
            return Err(Error::MessageTooLarge {
                size: self.remaining,
                max: self.config.max_message_size,
            });
        }
        Ok(true)
    }

    fn finish_stp0(&mut self) -> Result<()> {
        let service = String::from_utf16(&self.stp0.service).map_err(|_| Error::InvalidUtf16)?;
        let data = frame::decode_utf16be(&self.stp0.data)?;
        self.current = frame::parse_stp0_data(service, &data)?;
        self.stp0 = Stp0Progress::default();
        self.set_state(ReaderState::MessageDone);
        Ok(())
    }

    fn read_stp0_service(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            self.finish_stp0()?;
            return Ok(true);
        }
        let Some(unit) = self.peek_unit() else {
            return Ok(false);
        };
        if unit == SPACE {
            self.consume_body(2)?;
            self.set_state(ReaderState::Stp0Data);
        } else {
            self.stp0.service.try_reserve(1)?;
            self.consume_body(2)?;
            self.stp0.service.push(unit);
        }
        Ok(true)
    }

    fn read_stp0_data(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            self.finish_stp0()?;
            return Ok(true);
        }
        let take = self.remaining.min(self.available().len());
        if take == 0 {
            return Ok(false);
        }
        let start = self.pos;
        self.stp0.data.try_reserve(take)?;
        self.stp0.data.extend_from_slice(&self.input[start..start + take]);
        self.consume_body(take)?;
        Ok(true)
    }
}

const fn start_state(version: ProtocolVersion) -> ReaderState {
    match version {
        ProtocolVersion::Stp0 => ReaderState::Stp0Message,
        ProtocolVersion::Stp1 => ReaderState::Prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{encode_stp0, encode_stp1, encode_utf16be};

    fn console_event() -> TransportMessage {
        TransportMessage::event("console", 3)
            .with_format(PayloadFormat::Json)
            .with_payload(r#"[1,"hello"]"#)
    }

    #[test]
    fn test_single_message() {
        let bytes = encode_stp1(&console_event()).unwrap();
        let mut reader = StpReader::new(Vec::new());
        assert_eq!(reader.on_data_ready(&bytes).unwrap(), ReadStatus::Idle);
        assert_eq!(reader.handler(), &vec![console_event()]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = encode_stp1(&console_event()).unwrap();
        let mut reader = StpReader::new(Vec::new());
        for (i, byte) in bytes.iter().enumerate() {
            let status = reader.on_data_ready(std::slice::from_ref(byte)).unwrap();
            if i + 1 < bytes.len() {
                assert_eq!(status, ReadStatus::NotEnoughData);
            } else {
                assert_eq!(status, ReadStatus::Idle);
            }
        }
        assert_eq!(reader.into_handler(), vec![console_event()]);
    }

    #[test]
    fn test_back_to_back_messages() {
        let call = TransportMessage::call("window-manager", 1, 4).with_payload(&[0x08u8, 0x01][..]);
        let mut bytes = encode_stp1(&call).unwrap();
        bytes.extend(encode_stp1(&console_event()).unwrap());
        bytes.extend(encode_stp1(&call).unwrap());

        let mut reader = StpReader::new(Vec::new());
        reader.on_data_ready(&bytes[..10]).unwrap();
        reader.on_data_ready(&bytes[10..]).unwrap();
        assert_eq!(reader.handler(), &vec![call.clone(), console_event(), call]);
    }

    #[test]
    fn test_unknown_version_and_type_skipped() {
        let mut bytes = b"STP\x02\x03abc".to_vec();
        // type 9 with a one byte body remainder
        bytes.extend_from_slice(b"STP\x01\x02\x09\x00");
        bytes.extend(encode_stp1(&console_event()).unwrap());

        let mut reader = StpReader::new(Vec::new());
        assert_eq!(reader.on_data_ready(&bytes).unwrap(), ReadStatus::Idle);
        assert_eq!(reader.handler(), &vec![console_event()]);
    }

    #[test]
    fn test_unknown_fields_skipped() {
        // event, field 6 varint, field 7 bytes, field 9 fixed32, service "s"
        let body = [
            2u8, 0x30, 0x96, 0x01, 0x3A, 0x02, b'x', b'y', 0x4D, 1, 2, 3, 4, 0x0A, 0x01, b's',
        ];
        let mut bytes = b"STP\x01".to_vec();
        bytes.push(body.len() as u8);
        bytes.extend_from_slice(&body);

        let mut reader = StpReader::new(Vec::new());
        for byte in &bytes {
            reader.on_data_ready(std::slice::from_ref(byte)).unwrap();
        }
        let messages = reader.into_handler();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].service_name, "s");
    }

    #[test]
    fn test_bad_prefix_fails() {
        let mut reader = StpReader::new(Vec::new());
        let err = reader.on_data_ready(b"HTTP/1.1").unwrap_err();
        assert!(matches!(err, Error::ParsingFailed(_)));
        assert_eq!(reader.state(), &ReaderState::Failed(err.clone()));
        assert_eq!(reader.on_data_ready(b"STP\x01").unwrap_err(), err);
    }

    #[test]
    fn test_field_past_body_is_fatal() {
        // body of 4 bytes whose service claims 10
        let bytes = b"STP\x01\x04\x02\x0A\x0Aab";
        let mut reader = StpReader::new(Vec::new());
        assert!(matches!(
            reader.on_data_ready(bytes),
            Err(Error::LimitExceeded { needed: 10, .. })
        ));
    }

    #[test]
    fn test_max_message_size() {
        let config = ReaderConfig::default().with_max_message_size(8);
        let mut reader = StpReader::with_config(Vec::new(), config);
        assert_eq!(
            reader.on_data_ready(b"STP\x01\x09"),
            Err(Error::MessageTooLarge { size: 9, max: 8 })
        );
    }

    #[test]
    fn test_error_reported_to_handler() {
        #[derive(Default)]
        struct Recorder {
            errors: Vec<Error>,
        }

        impl MessageHandler for Recorder {
            fn on_message(&mut self, _: TransportMessage) {}

            fn on_error(&mut self, error: &Error) {
                self.errors.push(error.clone());
            }
        }

        let mut reader = StpReader::new(Recorder::default());
        let _ = reader.on_data_ready(b"STP\x01\x02\x02\x0B");
        assert_eq!(reader.handler().errors.len(), 1);
    }

    #[test]
    fn test_reset_discards_partial() {
        let bytes = encode_stp1(&console_event()).unwrap();
        let mut reader = StpReader::new(Vec::new());
        reader.on_data_ready(&bytes[..7]).unwrap();
        reader.reset();
        assert_eq!(reader.state(), &ReaderState::Prefix);
        reader.on_data_ready(&bytes).unwrap();
        assert_eq!(reader.handler().len(), 1);
    }

    #[test]
    fn test_stp0_plain_and_tunnel() {
        let plain = TransportMessage::event("console", 0)
            .with_format(PayloadFormat::Json)
            .with_version(ProtocolVersion::Stp0)
            .with_payload("[\"caf\u{e9}\"]");
        let tunneled = TransportMessage::error_for(&TransportMessage::call("scope", 9, 3), 2)
            .with_format(PayloadFormat::Binary)
            .with_payload(&[0xFFu8, 0x00][..]);

        let mut bytes = encode_stp0(&plain).unwrap();
        bytes.extend(encode_stp0(&tunneled).unwrap());

        let config = ReaderConfig::default().with_protocol_version(ProtocolVersion::Stp0);
        let mut reader = StpReader::with_config(Vec::new(), config);
        for byte in &bytes {
            reader.on_data_ready(std::slice::from_ref(byte)).unwrap();
        }
        assert_eq!(reader.into_handler(), vec![plain, tunneled]);
    }

    #[test]
    fn test_stp0_bad_length() {
        let config = ReaderConfig::default().with_protocol_version(ProtocolVersion::Stp0);
        let mut reader = StpReader::with_config(Vec::new(), config);
        assert!(reader.on_data_ready(&encode_utf16be("1x ")).is_err());
    }

    #[test]
    fn test_switch_protocol_between_messages() {
        let mut reader = StpReader::new(Vec::new());
        reader.set_protocol_version(ProtocolVersion::Stp0);
        assert_eq!(reader.state(), &ReaderState::Stp0Message);

        let plain = TransportMessage::event("s", 0)
            .with_format(PayloadFormat::Json)
            .with_version(ProtocolVersion::Stp0)
            .with_payload("1");
        reader.on_data_ready(&encode_stp0(&plain).unwrap()).unwrap();
        reader.set_protocol_version(ProtocolVersion::Stp1);
        reader.on_data_ready(&encode_stp1(&console_event()).unwrap()).unwrap();
        assert_eq!(reader.into_handler(), vec![plain, console_event()]);
    }
}
