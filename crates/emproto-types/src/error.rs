//! Error types for EM protocol operations.

use crate::Serial;
use thiserror::Error;

/// Main error type surfaced by the library.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmError {
    /// The EVSE has not been seen on the network within the online window.
    #[error("EVSE is offline: {serial}")]
    Offline { serial: Serial },

    /// Operation requires the EVSE to be offline (e.g. removal).
    #[error("EVSE is online: {serial}")]
    Online { serial: Serial },

    /// The communicator is not logged in to the EVSE.
    #[error("EVSE is not logged in: {serial}")]
    NotLoggedIn { serial: Serial },

    /// No password is stored for the EVSE.
    #[error("No password for EVSE: {serial}")]
    NoPassword { serial: Serial },

    /// The EVSE rejected the password.
    #[error("Invalid password for EVSE: {serial}")]
    InvalidPassword { serial: Serial },

    /// No EVSE with this serial is known.
    #[error("EVSE serial is unknown: {serial}")]
    UnknownEvse { serial: Serial },

    /// A frame could not be encoded or decoded.
    #[error("Invalid datagram: {message}")]
    InvalidDatagram { message: String },

    /// A response frame did not have the expected shape.
    #[error("Invalid response for command 0x{command:04x} from EVSE: {serial}")]
    InvalidResponse { serial: Serial, command: u16 },

    /// Sending a frame failed at the transport.
    #[error("Failed to send datagram: {message}")]
    SendFailed { message: String },

    /// No matching response arrived within the timeout.
    #[error("Timeout waiting for datagram")]
    Timeout,

    /// The communicator was stopped while an operation was in flight.
    #[error("Communicator stopped while waiting for datagram")]
    Stopped,

    /// One or more configuration fields could not be fetched.
    #[error("Failed to get some configuration fields for EVSE {serial}: {fields:?}")]
    ConfigFetch { serial: Serial, fields: Vec<String> },
}

/// Result type alias for EM protocol operations.
pub type EmResult<T> = Result<T, EmError>;
