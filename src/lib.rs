//! Scope Transport Protocol: framing and message codecs for remote debugging
//!
//! A debugger talks to a browser host over one byte stream carrying
//! [`TransportMessage`]s. Each message routes a payload to a service and
//! command, and the payload is a schema-described message encoded as
//! protobuf-compatible binary, positional JSON or XML.
//!
//! # Frame Format
//!
//! ```text
//! STP/1  +-------+--------+-------------+------+----------------------------+
//!        | "STP" | 0x01   | body varint | type | header fields, payload (8) |
//!        +-------+--------+-------------+------+----------------------------+
//!
//! STP/0  "<byte len> <service> <data>"    UTF-16BE text
//! ```
//!
//! # Features
//!
//! - Resumable [`StpReader`] that accepts input in chunks of any size
//! - [`StpWriter`] queue that tolerates partial sends
//! - Schema-driven binary, JSON and XML codecs over any [`Message`]
//! - [`DynamicMessage`] for schemas only known at runtime
//! - STP/0 with tunneling of STP/1 messages
//!
//! # Example
//!
//! ```rust
//! use scope_stp::messages::{commands, services, ConsoleMessage};
//! use scope_stp::{PayloadFormat, StpReader, StpWriter, TransportMessage};
//!
//! let mut event = TransportMessage::event(services::CONSOLE, commands::ON_CONSOLE_MESSAGE)
//!     .with_format(PayloadFormat::Json);
//! event.set_message(&ConsoleMessage::new(1, 1_700_000_000, "hello"))?;
//!
//! let mut writer = StpWriter::new(Vec::new());
//! writer.enqueue_message(event)?;
//!
//! let mut reader = StpReader::new(Vec::new());
//! reader.on_data_ready(writer.sink())?;
//!
//! let mut console = ConsoleMessage::default();
//! reader.handler()[0].parse_message(&mut console)?;
//! assert_eq!(console.description, "hello");
//! # Ok::<(), scope_stp::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bitmap;
pub mod buffer;
pub mod codec;
pub mod decoder;
pub mod dynamic;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod messages;
pub mod proxy;
pub mod reader;
pub mod schema;
pub mod transport;
pub mod varint;
pub mod wire;
pub mod writer;

// Re-export main types
pub use buffer::ByteBuffer;
pub use codec::{DecodeOptions, PayloadFormat, UnknownFields};
pub use dynamic::{DynamicMessage, DynamicValue};
pub use error::{Error, Result};
pub use proxy::{FieldMut, FieldRef, Message, MessageMut, MessageRef, RepeatedField};
pub use reader::{MessageHandler, ReadStatus, ReaderConfig, StpReader};
pub use schema::{FieldDescriptor, FieldKind, MessageDescriptor};
pub use transport::{MessageKind, ProtocolVersion, TransportMessage};
pub use writer::{DataSink, StpWriter, WriterConfig};

/// Magic bytes opening every STP/1 frame
pub const STP_MAGIC: &[u8; 3] = b"STP";

/// STP/1 version byte
pub const STP_VERSION: u8 = 1;

/// Largest message body accepted by default (16MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Header field: service name
pub const FIELD_SERVICE: u32 = 1;
/// Header field: command id
pub const FIELD_COMMAND: u32 = 2;
/// Header field: payload format
pub const FIELD_FORMAT: u32 = 3;
/// Header field: error status
pub const FIELD_STATUS: u32 = 4;
/// Header field: call tag
pub const FIELD_TAG: u32 = 5;
/// Header field: payload chunk
pub const FIELD_PAYLOAD: u32 = 8;
/// Tunnel header field: message kind
pub const FIELD_KIND: u32 = 10;
