//! Error types for frame encoding and decoding.

use emproto_types::EmError;
use thiserror::Error;

/// Error produced by the datagram codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The serial is not exactly 16 hexadecimal characters.
    #[error("serial must be 16 hex characters, got {serial:?}")]
    InvalidSerial { serial: String },

    /// A frame passed magic and length validation but its checksum did not
    /// match.
    #[error("checksum mismatch, computed {computed:04x} does not match {expected:04x} from packet")]
    ChecksumMismatch { computed: u16, expected: u16 },
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

impl From<CodecError> for EmError {
    fn from(err: CodecError) -> Self {
        EmError::InvalidDatagram {
            message: err.to_string(),
        }
    }
}
