//! Error types for the scope transport and its codecs

use thiserror::Error;

/// Errors that can occur while encoding, decoding or framing messages
///
/// Running out of input on a stream is not an error: the reader reports it as
/// [`crate::reader::ReadStatus::NotEnoughData`] and resumes on the next call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Output buffer too small for the operation
    #[error("buffer too small for operation")]
    ShortBuffer,

    /// Input ended in the middle of a value
    #[error("unexpected end of data")]
    UnexpectedEof,

    /// Integer overflow, either in a varint or in a narrowing conversion
    #[error("integer overflow")]
    Overflow,

    /// Tag carried a wire type this format does not use
    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    /// Tag carried field number zero or a number out of range
    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    /// Field was encoded with a different wire type than the schema declares
    #[error("field `{field}` expects wire type {expected}, got {actual}")]
    WireTypeMismatch {
        /// Field name from the descriptor
        field: &'static str,
        /// Wire type declared by the schema
        expected: u8,
        /// Wire type found on the wire
        actual: u8,
    },

    /// Field number not present in the message descriptor
    #[error("unknown field number {number} in message `{message}`")]
    UnknownField {
        /// Message name from the descriptor
        message: &'static str,
        /// Field number found on the wire
        number: u32,
    },

    /// Accessor does not match the field kind
    #[error("type mismatch on field `{field}`: expected {expected}")]
    TypeMismatch {
        /// Field name from the descriptor
        field: &'static str,
        /// Kind the accessor expected
        expected: &'static str,
    },

    /// Field index past the end of the descriptor
    #[error("field index {index} out of range for message `{message}`")]
    FieldIndexOutOfRange {
        /// Message name from the descriptor
        message: &'static str,
        /// Requested index
        index: usize,
    },

    /// A required field was not present in the input
    #[error("missing required field `{field}` in message `{message}`")]
    MissingRequiredField {
        /// Message name from the descriptor
        message: &'static str,
        /// Field name from the descriptor
        field: &'static str,
    },

    /// Declared length does not match the bytes actually consumed
    #[error("size mismatch: declared {declared} bytes, consumed {consumed}")]
    SizeMismatch {
        /// Length prefix found on the wire
        declared: usize,
        /// Bytes the value actually used
        consumed: usize,
    },

    /// Value would read past the enclosing length limit
    #[error("length limit exceeded: need {needed} bytes, {remaining} remaining")]
    LimitExceeded {
        /// Bytes the value needs
        needed: usize,
        /// Bytes left under the current limit
        remaining: usize,
    },

    /// Malformed token in a textual format
    #[error("malformed token at offset {offset}: {reason}")]
    MalformedToken {
        /// Byte offset into the input where the problem was found
        offset: usize,
        /// What was wrong
        reason: String,
    },

    /// String data was not valid UTF-8
    #[error("invalid UTF-8 in string data")]
    InvalidUtf8,

    /// STP/0 data was not valid UTF-16
    #[error("invalid UTF-16 in legacy frame")]
    InvalidUtf16,

    /// Bytes field was not valid base64
    #[error("invalid base64 data")]
    InvalidBase64,

    /// Malformed framing, fatal to the stream
    #[error("parsing failed: {0}")]
    ParsingFailed(String),

    /// Message body larger than the configured maximum
    #[error("message of {size} bytes exceeds maximum {max}")]
    MessageTooLarge {
        /// Size claimed by the frame
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Protocol version this side cannot produce
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u8),

    /// Unknown message type byte
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// Unknown payload format value
    #[error("unknown payload format {0}")]
    UnknownPayloadFormat(u64),

    /// Payload format not compiled into this build
    #[error("payload format {0} is not enabled")]
    FormatDisabled(&'static str),

    /// Message has no faithful STP/0 representation
    #[error("message cannot be framed as STP/0: {0}")]
    NotStp0Representable(&'static str),

    /// Acknowledged more bytes than are in flight
    #[error("acknowledged {acknowledged} bytes but only {pending} pending")]
    InvalidAcknowledgement {
        /// Bytes the caller reported as sent
        acknowledged: usize,
        /// Bytes actually waiting for acknowledgement
        pending: usize,
    },

    /// Submessages nested deeper than the decoder allows
    #[error("message nesting exceeds depth {0}")]
    NestingTooDeep(usize),

    /// Allocation failed while growing a buffer
    #[error("out of memory")]
    OutOfMemory,

    /// Schema definition is inconsistent
    #[error("invalid schema for `{message}`: {reason}")]
    InvalidSchema {
        /// Message name from the descriptor
        message: &'static str,
        /// What was wrong
        reason: String,
    },
}

impl Error {
    /// Short helper for textual decode failures
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedToken {
            offset,
            reason: reason.into(),
        }
    }

    /// True when the error means the stream cannot continue
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Error::OutOfMemory)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<base64::DecodeError> for Error {
    fn from(_: base64::DecodeError) -> Self {
        Error::InvalidBase64
    }
}

/// Result type alias for transport and codec operations
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_field() {
        let err = Error::MissingRequiredField {
            message: "ConsoleMessage",
            field: "description",
        };
        assert_eq!(
            err.to_string(),
            "missing required field `description` in message `ConsoleMessage`"
        );
    }

    #[test]
    fn test_out_of_memory_is_not_fatal() {
        assert!(!Error::OutOfMemory.is_fatal());
        assert!(Error::ParsingFailed("bad prefix".into()).is_fatal());
    }
}
