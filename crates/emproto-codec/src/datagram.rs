//! The EM protocol frame and its codec.
//!
//! Frame layout, all multibyte fields big-endian:
//!
//! ```text
//!  0..2   magic      0x0601
//!  2..4   total length in bytes
//!  4..5   key (opaque, echoed on decode)
//!  5..13  serial, 8 raw bytes
//! 13..19  password, 6 bytes or all-zero when unset
//! 19..21  command
//! 21..-4  payload
//! -4..-2  checksum
//! -2..    trailer     0x0F02
//! ```

use crate::command::Command;
use crate::error::{CodecError, CodecResult};
use crate::wire;
use emproto_types::{Password, Serial};

const MAGIC: u16 = 0x0601;
const TRAILER: u16 = 0x0F02;

/// Frame overhead outside the payload: header through command, plus
/// checksum and trailer.
pub const MIN_FRAME_LEN: usize = 25;

/// One protocol message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Datagram {
    pub key: u8,
    pub serial: Serial,
    pub password: Password,
    pub command: Command,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(command: Command, payload: impl Into<Vec<u8>>) -> Self {
        Datagram {
            key: 0,
            serial: Serial::default(),
            password: Password::default(),
            command,
            payload: payload.into(),
        }
    }

    pub fn with_password(mut self, password: Password) -> Self {
        self.password = password;
        self
    }

    /// Encode this datagram into a wire frame.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let frame_len = MIN_FRAME_LEN + self.payload.len();
        let mut data = vec![0u8; frame_len];

        data[0..2].copy_from_slice(&MAGIC.to_be_bytes());
        data[2..4].copy_from_slice(&(frame_len as u16).to_be_bytes());
        data[4] = self.key;

        let serial = self.serial.to_bytes().ok_or_else(|| CodecError::InvalidSerial {
            serial: self.serial.as_str().to_string(),
        })?;
        data[5..13].copy_from_slice(&serial);

        // A password that is not exactly 6 bytes encodes as all-zero bytes.
        if let Some(password) = self.password.to_bytes() {
            data[13..19].copy_from_slice(&password);
        }

        data[19..21].copy_from_slice(&self.command.0.to_be_bytes());
        data[21..21 + self.payload.len()].copy_from_slice(&self.payload);

        let checksum = checksum(&data[..frame_len - 4]);
        data[frame_len - 4..frame_len - 2].copy_from_slice(&checksum.to_be_bytes());
        data[frame_len - 2..].copy_from_slice(&TRAILER.to_be_bytes());
        Ok(data)
    }

    /// Decode a wire frame.
    ///
    /// Returns `Ok(None)` for data that is not an EM protocol frame at all
    /// (too short, wrong magic, or a length field that disagrees with the
    /// actual length); `Err` only for a frame that passed framing but
    /// failed its checksum.
    pub fn decode(data: &[u8]) -> CodecResult<Option<Datagram>> {
        if data.len() < MIN_FRAME_LEN {
            return Ok(None);
        }
        if wire::read_u16(data, 0) != MAGIC {
            return Ok(None);
        }
        if wire::read_u16(data, 2) as usize != data.len() {
            return Ok(None);
        }

        let expected = wire::read_u16(data, data.len() - 4);
        let computed = checksum(&data[..data.len() - 4]);
        if computed != expected {
            return Err(CodecError::ChecksumMismatch { computed, expected });
        }

        let mut serial = [0u8; 8];
        serial.copy_from_slice(&data[5..13]);

        Ok(Some(Datagram {
            key: data[4],
            serial: Serial::from_bytes(serial),
            password: Password::new(wire::read_string(&data[13..19])),
            command: Command(wire::read_u16(data, 19)),
            payload: data[21..data.len() - 4].to_vec(),
        }))
    }
}

/// Sum of the byte values modulo 0xFFFF (not 0x10000).
fn checksum(data: &[u8]) -> u16 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (sum % 0xFFFF) as u16
}

impl std::fmt::Display for Datagram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let payload = if self.payload.is_empty() {
            "(empty)".to_string()
        } else {
            self.payload
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(" ")
        };
        write!(
            f,
            "Datagram{{command:{} serial:{} key:{} password:{} payload:{} payload_len:{}}}",
            self.command,
            self.serial,
            self.key,
            self.password,
            payload,
            self.payload.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Datagram {
        Datagram {
            key: 7,
            serial: Serial::new("aabbccddeeff0011"),
            password: Password::new("123456"),
            command: Command::SINGLE_AC_STATUS,
            payload: vec![0x01, 0x02, 0x03, 0x04, 0x05],
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let datagram = sample();
        let data = datagram.encode().unwrap();
        assert_eq!(data.len(), MIN_FRAME_LEN + 5);

        let decoded = Datagram::decode(&data).unwrap().unwrap();
        assert_eq!(decoded, datagram);
    }

    #[test]
    fn encode_zeroes_short_password() {
        let mut datagram = sample();
        datagram.password = Password::new("123");
        let data = datagram.encode().unwrap();
        assert_eq!(&data[13..19], &[0u8; 6]);

        let decoded = Datagram::decode(&data).unwrap().unwrap();
        assert!(!decoded.password.is_set());
    }

    #[test]
    fn encode_rejects_invalid_serial() {
        let mut datagram = sample();
        datagram.serial = Serial::new("not-a-serial");
        assert!(matches!(
            datagram.encode(),
            Err(CodecError::InvalidSerial { .. })
        ));
    }

    #[test]
    fn decode_ignores_foreign_data() {
        // Too short.
        assert_eq!(Datagram::decode(&[0x06, 0x01, 0x00]).unwrap(), None);

        // Wrong magic.
        let mut data = sample().encode().unwrap();
        data[0] = 0xFF;
        assert_eq!(Datagram::decode(&data).unwrap(), None);

        // Length field disagrees with actual length.
        let mut data = sample().encode().unwrap();
        data.push(0x00);
        assert_eq!(Datagram::decode(&data).unwrap(), None);
    }

    #[test]
    fn decode_reports_corruption() {
        let mut data = sample().encode().unwrap();
        // Flip a payload byte without fixing up the checksum.
        data[21] ^= 0xFF;
        assert!(matches!(
            Datagram::decode(&data),
            Err(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn corruption_is_caught_for_any_covered_byte() {
        let data = sample().encode().unwrap();
        for i in 0..data.len() - 4 {
            let mut corrupted = data.clone();
            corrupted[i] ^= 0x01;
            match Datagram::decode(&corrupted) {
                // Breaking magic or the length field downgrades the frame
                // to not-our-protocol rather than an error.
                Ok(None) => assert!(i < 4),
                Ok(Some(_)) => panic!("corrupted byte {i} went undetected"),
                Err(CodecError::ChecksumMismatch { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn checksum_wraps_modulo_0xffff() {
        // 257 * 0xFF == 0xFFFF, which the 0xFFFF modulus maps to zero
        // (a 0x10000 modulus would give 0xFEFF).
        assert_eq!(checksum(&[0xFF; 257]), 0);
        assert_eq!(checksum(&[0xFF; 258]), 0xFF);
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x01, 0x02, 0x03]), 6);
    }

    #[test]
    fn display_redacts_password() {
        let text = sample().to_string();
        assert!(text.contains("password:(set)"));
        assert!(!text.contains("123456"));

        let empty = Datagram::new(Command::HEADING_RESPONSE, vec![]);
        assert!(empty.to_string().contains("payload:(empty)"));
    }
}
