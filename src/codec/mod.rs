//! Schema-driven payload codecs
//!
//! Every codec walks a [`MessageDescriptor`](crate::schema::MessageDescriptor)
//! and reaches the data through [`Message`], so one implementation per format
//! serves all message types:
//!
//! - [`binary`]: protobuf-compatible wire format
//! - [`json`]: positional arrays, one slot per declared field
//! - `xml`: one element per field, behind the `xml` feature

pub mod binary;
pub mod json;
#[cfg(feature = "xml")]
pub mod xml;

use crate::error::{Error, Result};
use crate::proxy::Message;

/// Default limit on submessage nesting during decode
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Encoding of a message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PayloadFormat {
    /// Protobuf-compatible binary
    #[default]
    Binary = 0,
    /// Positional JSON arrays
    Json = 1,
    /// XML elements
    Xml = 2,
}

impl PayloadFormat {
    /// Parse the wire value of the format field
    pub fn from_u64(value: u64) -> Result<Self> {
        match value {
            0 => Ok(PayloadFormat::Binary),
            1 => Ok(PayloadFormat::Json),
            2 => Ok(PayloadFormat::Xml),
            other => Err(Error::UnknownPayloadFormat(other)),
        }
    }

    /// Wire value of the format field
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }

    /// Lower-case name
    pub const fn name(self) -> &'static str {
        match self {
            PayloadFormat::Binary => "binary",
            PayloadFormat::Json => "json",
            PayloadFormat::Xml => "xml",
        }
    }
}

/// What a decoder does with data the schema does not describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFields {
    /// Drop it and keep going
    #[default]
    Skip,
    /// Fail with `Error::UnknownField`
    Reject,
}

/// Decoder settings shared by all formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Handling of unknown fields, trailing positions and elements
    pub unknown_fields: UnknownFields,
    /// Maximum submessage nesting
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            unknown_fields: UnknownFields::Skip,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl DecodeOptions {
    /// Set unknown field handling
    pub fn with_unknown_fields(mut self, unknown_fields: UnknownFields) -> Self {
        self.unknown_fields = unknown_fields;
        self
    }

    /// Set the nesting limit
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::NestingTooDeep(self.max_depth));
        }
        Ok(())
    }
}

/// Encode `message` in `format`
pub fn encode(message: &dyn Message, format: PayloadFormat) -> Result<Vec<u8>> {
    match format {
        PayloadFormat::Binary => binary::encode(message),
        PayloadFormat::Json => json::encode(message),
        #[cfg(feature = "xml")]
        PayloadFormat::Xml => xml::encode(message),
        #[cfg(not(feature = "xml"))]
        PayloadFormat::Xml => Err(Error::FormatDisabled("xml")),
    }
}

/// Decode `data` in `format` into `message` with default options
pub fn decode(message: &mut dyn Message, format: PayloadFormat, data: &[u8]) -> Result<()> {
    decode_with(message, format, data, &DecodeOptions::default())
}

/// Decode `data` in `format` into `message`
pub fn decode_with(
    message: &mut dyn Message,
    format: PayloadFormat,
    data: &[u8],
    options: &DecodeOptions,
) -> Result<()> {
    match format {
        PayloadFormat::Binary => binary::decode_with(message, data, options),
        PayloadFormat::Json => json::decode_with(message, data, options),
        #[cfg(feature = "xml")]
        PayloadFormat::Xml => xml::decode_with(message, data, options),
        #[cfg(not(feature = "xml"))]
        PayloadFormat::Xml => Err(Error::FormatDisabled("xml")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ConsoleMessage, Severity};

    #[test]
    fn test_format_values() {
        assert_eq!(PayloadFormat::from_u64(1).unwrap(), PayloadFormat::Json);
        assert_eq!(PayloadFormat::Xml.as_u64(), 2);
        assert_eq!(
            PayloadFormat::from_u64(7),
            Err(Error::UnknownPayloadFormat(7))
        );
    }

    #[test]
    fn test_dispatch_round_trip() {
        let mut msg = ConsoleMessage::new(2, 99, "dispatch");
        msg.set_severity(Severity::Warning);

        for format in [PayloadFormat::Binary, PayloadFormat::Json] {
            let bytes = encode(&msg, format).unwrap();
            let mut back = ConsoleMessage::default();
            decode(&mut back, format, &bytes).unwrap();
            assert_eq!(back, msg, "{}", format.name());
        }
    }

    #[cfg(not(feature = "xml"))]
    #[test]
    fn test_xml_disabled() {
        let msg = ConsoleMessage::default();
        assert_eq!(
            encode(&msg, PayloadFormat::Xml),
            Err(Error::FormatDisabled("xml"))
        );
    }
}
