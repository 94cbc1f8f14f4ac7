//! Error types for the UDP transport.

use emproto_types::EmError;
use thiserror::Error;

/// Error produced by the transport layer.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Binding the local socket failed.
    #[error("failed to bind UDP socket: {source}")]
    Bind {
        #[source]
        source: std::io::Error,
    },

    /// Sending a frame failed.
    #[error("failed to send datagram: {source}")]
    Send {
        #[source]
        source: std::io::Error,
    },

    /// The socket accepted fewer bytes than the frame length.
    #[error("incomplete write ({sent} of {expected} bytes sent)")]
    PartialSend { sent: usize, expected: usize },

    /// The endpoint is not running.
    #[error("endpoint is not started")]
    NotStarted,
}

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for EmError {
    fn from(err: TransportError) -> Self {
        EmError::SendFailed {
            message: err.to_string(),
        }
    }
}
