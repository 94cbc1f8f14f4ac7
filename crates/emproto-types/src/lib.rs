//! # EM Protocol Types
//!
//! This crate provides the foundational types and data structures for the EM
//! charging-station protocol. It includes identifier newtypes, unit aliases,
//! the per-EVSE state model, events, and charge-control parameters shared by
//! the codec, transport and client crates.

pub mod charge;
pub mod error;
pub mod event;
pub mod model;

pub use charge::*;
pub use error::*;
pub use event::*;
pub use model::*;

/// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

/// EVSE serial number: 16 lowercase hexadecimal characters externally,
/// 8 raw bytes on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(String);

impl Serial {
    /// Create a serial from its external hex representation. The value is
    /// lowercased but not otherwise validated; [`Serial::to_bytes`] reports
    /// malformed serials when a frame is actually encoded.
    pub fn new(serial: impl Into<String>) -> Self {
        Serial(serial.into().to_ascii_lowercase())
    }

    /// Build a serial from the 8 raw wire bytes.
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        let mut s = String::with_capacity(16);
        for b in bytes {
            s.push_str(&format!("{b:02x}"));
        }
        Serial(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this serial is exactly 16 hex characters.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 16 && self.0.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Convert to the 8 raw wire bytes. Returns `None` for a serial that is
    /// not exactly 16 hex characters.
    pub fn to_bytes(&self) -> Option<[u8; 8]> {
        if !self.is_valid() {
            return None;
        }
        let mut bytes = [0u8; 8];
        for (i, chunk) in self.0.as_bytes().chunks_exact(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }
        Some(bytes)
    }
}

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Serial {
    fn from(s: &str) -> Self {
        Serial::new(s)
    }
}

impl std::str::FromStr for Serial {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Serial::new(s))
    }
}

/// EVSE password: 6 digits externally, 6 bytes at a fixed offset on the
/// wire. An empty password means "not set" and encodes as six zero bytes.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(password: impl Into<String>) -> Self {
        Password(password.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_set(&self) -> bool {
        !self.0.is_empty()
    }

    /// The 6 wire bytes, or `None` when the password is not exactly 6 bytes
    /// long (in which case the frame carries six zero bytes instead).
    pub fn to_bytes(&self) -> Option<[u8; 6]> {
        let bytes = self.0.as_bytes();
        if bytes.len() != 6 {
            return None;
        }
        let mut out = [0u8; 6];
        out.copy_from_slice(bytes);
        Some(out)
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Password::new(s)
    }
}

// Passwords never appear in logs or debug dumps.
impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_set() {
            write!(f, "(set)")
        } else {
            write!(f, "(not set)")
        }
    }
}

impl std::fmt::Display for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Identifier of the user starting or stopping a charge; maximum 16 ASCII
/// characters on the wire (truncated if longer).
pub type UserId = String;

/// Identifier of a charge session; maximum 16 ASCII characters on the wire.
pub type ChargeId = String;

/// Electrical line (phase group) identifier within an EVSE.
pub type LineId = u8;

/// Voltage in volts.
pub type Volts = f32;

/// Current in amperes.
pub type Amps = f32;

/// Power in watts.
pub type Watts = u32;

/// Energy in kilowatt-hours.
pub type KWh = f64;

/// Temperature in degrees Celsius.
pub type Celsius = f32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_roundtrip() {
        let serial = Serial::new("AABBCCDDEEFF0011");
        assert_eq!(serial.as_str(), "aabbccddeeff0011");
        assert!(serial.is_valid());

        let bytes = serial.to_bytes().unwrap();
        assert_eq!(bytes, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11]);
        assert_eq!(Serial::from_bytes(bytes), serial);
    }

    #[test]
    fn serial_rejects_bad_input() {
        assert!(!Serial::new("too-short").is_valid());
        assert!(Serial::new("zzbbccddeeff0011").to_bytes().is_none());
        assert!(Serial::new("aabbccddeeff00112233").to_bytes().is_none());
    }

    #[test]
    fn password_bytes() {
        assert_eq!(Password::new("123456").to_bytes(), Some(*b"123456"));
        assert_eq!(Password::new("1234").to_bytes(), None);
        assert_eq!(Password::default().to_bytes(), None);
        assert!(!Password::default().is_set());
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        assert_eq!(format!("{:?}", Password::new("123456")), "(set)");
        assert_eq!(format!("{:?}", Password::default()), "(not set)");
    }

    #[test]
    fn serial_serde_is_transparent() {
        let serial = Serial::new("aabbccddeeff0011");
        let json = serde_json::to_string(&serial).unwrap();
        assert_eq!(json, "\"aabbccddeeff0011\"");
        let back: Serial = serde_json::from_str(&json).unwrap();
        assert_eq!(back, serial);
    }
}
