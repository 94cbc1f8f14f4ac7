//! Readers and writers for the scaled and sentinel-laden payload fields.
//!
//! Scalings on the wire: voltages in 0.1 V, currents in 0.01 A, energies in
//! 0.01 kWh, temperatures in 0.01 degrees Celsius offset by -20000 raw.
//! `0xFFFF` / `0xFFFFFFFF` mean "absent" and never leak past this module.

use crate::time;
use chrono::{DateTime, Utc};
use emproto_types::{Amps, Celsius, KWh, UserId, Volts};
use std::time::Duration;

pub fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

pub fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

pub fn write_u16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

pub fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Read a fixed-width string field, trimming NUL, 0xFF and space padding
/// from both ends.
pub fn read_string(data: &[u8]) -> String {
    let is_pad = |b: &u8| matches!(b, 0x00 | 0xFF | 0x20);
    let start = data.iter().position(|b| !is_pad(b));
    let end = data.iter().rposition(|b| !is_pad(b));
    match (start, end) {
        (Some(start), Some(end)) => String::from_utf8_lossy(&data[start..=end]).into_owned(),
        _ => String::new(),
    }
}

/// Voltage in 0.1 V steps.
pub fn read_voltage(data: &[u8], offset: usize) -> Volts {
    read_u16(data, offset) as f32 * 0.1
}

/// Current in 0.01 A steps.
pub fn read_current(data: &[u8], offset: usize) -> Amps {
    read_u16(data, offset) as f32 * 0.01
}

/// 16-bit energy in 0.01 kWh steps; 0xFFFF means absent.
pub fn read_energy16(data: &[u8], offset: usize) -> Option<KWh> {
    match read_u16(data, offset) {
        0xFFFF => None,
        value => Some(value as f64 * 0.01),
    }
}

/// 32-bit energy in 0.01 kWh steps; 0xFFFFFFFF means absent.
pub fn read_energy32(data: &[u8], offset: usize) -> Option<KWh> {
    match read_u32(data, offset) {
        0xFFFFFFFF => None,
        value => Some(value as f64 * 0.01),
    }
}

/// Temperature in 0.01 degree steps offset by -20000 raw; the 0xFFFF
/// sentinel maps to -1.0.
pub fn read_temperature(data: &[u8], offset: usize) -> Celsius {
    match read_u16(data, offset) {
        0xFFFF => -1.0,
        raw => raw.wrapping_sub(20000) as f32 * 0.01,
    }
}

/// Duration in whole minutes; 0xFFFF means unlimited.
pub fn read_duration_minutes(data: &[u8], offset: usize) -> Option<Duration> {
    match read_u16(data, offset) {
        0xFFFF => None,
        value => Some(Duration::from_secs(value as u64 * 60)),
    }
}

/// Duration in whole seconds.
pub fn read_duration_seconds(data: &[u8], offset: usize) -> Duration {
    Duration::from_secs(read_u32(data, offset) as u64)
}

/// Protocol timestamp; 0 and 0xFFFFFFFF mean absent.
pub fn read_timestamp(data: &[u8], offset: usize) -> Option<DateTime<Utc>> {
    time::from_wire(read_u32(data, offset))
}

/// Write a user id into a fixed 16-byte field, ASCII, right-padded with
/// zeros and truncated if longer.
pub fn write_user_id(buffer: &mut [u8], user_id: &UserId) {
    let bytes = user_id.as_bytes();
    let len = bytes.len().min(16).min(buffer.len());
    buffer[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_trimming() {
        assert_eq!(read_string(b"Foo\x00\x00\x00"), "Foo");
        assert_eq!(read_string(b"\xFF\xFFBar \x00"), "Bar");
        assert_eq!(read_string(b"\x00\xFF \x00"), "");
        assert_eq!(read_string(b"a b"), "a b");
    }

    #[test]
    fn electrical_scalings() {
        let data = [0x08, 0xFC, 0x02, 0x58]; // 2300, 600
        assert!((read_voltage(&data, 0) - 230.0).abs() < 1e-3);
        assert!((read_current(&data, 2) - 6.0).abs() < 1e-3);
    }

    #[test]
    fn energy_sentinels() {
        assert_eq!(read_energy16(&[0xFF, 0xFF], 0), None);
        assert_eq!(read_energy16(&[0x03, 0xE8], 0), Some(10.0));
        assert_eq!(read_energy32(&[0xFF, 0xFF, 0xFF, 0xFF], 0), None);
        assert_eq!(read_energy32(&[0x00, 0x00, 0x03, 0xE8], 0), Some(10.0));
    }

    #[test]
    fn temperature_offset_and_sentinel() {
        // 22500 raw -> 25.00 C
        assert!((read_temperature(&[0x57, 0xE4], 0) - 25.0).abs() < 1e-3);
        assert_eq!(read_temperature(&[0xFF, 0xFF], 0), -1.0);
    }

    #[test]
    fn durations() {
        assert_eq!(read_duration_minutes(&[0xFF, 0xFF], 0), None);
        assert_eq!(
            read_duration_minutes(&[0x00, 0x5A], 0),
            Some(Duration::from_secs(90 * 60))
        );
        assert_eq!(
            read_duration_seconds(&[0x00, 0x00, 0x0E, 0x10], 0),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn user_id_truncation() {
        let mut buffer = [0u8; 16];
        write_user_id(&mut buffer, &"a-rather-long-user-name".to_string());
        assert_eq!(&buffer, b"a-rather-long-us");

        let mut buffer = [0u8; 16];
        write_user_id(&mut buffer, &"short".to_string());
        assert_eq!(&buffer[..5], b"short");
        assert!(buffer[5..].iter().all(|&b| b == 0));
    }
}
