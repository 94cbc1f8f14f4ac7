//! Protocol timestamps and charge-id construction.
//!
//! EVSEs carry 32-bit timestamps that are Asia/Shanghai wall-clock values
//! interpreted as if they were UTC, so converting to and from host time
//! means shifting by the difference between the Shanghai offset and the
//! local offset at that moment. Charge ids embed the Shanghai calendar date
//! for the same reason.

use chrono::{DateTime, Local, Offset, TimeZone, Utc};
use chrono_tz::Asia::Shanghai;
use emproto_types::ChargeId;
use rand::Rng;

/// Wire value meaning "no timestamp".
const ABSENT: u32 = 0xFFFFFFFF;

/// Offset in seconds between the local timezone and Asia/Shanghai at the
/// given instant.
fn shanghai_minus_local(t: DateTime<Utc>) -> i64 {
    let local = t.with_timezone(&Local).offset().fix().local_minus_utc() as i64;
    let shanghai = t.with_timezone(&Shanghai).offset().fix().local_minus_utc() as i64;
    shanghai - local
}

/// Convert a host timestamp to the wire representation.
pub fn to_wire(t: Option<DateTime<Utc>>) -> u32 {
    match t {
        Some(t) if t.timestamp_millis() != 0 => {
            (t.timestamp() - shanghai_minus_local(t)) as u32
        }
        _ => ABSENT,
    }
}

/// Convert a wire timestamp back to host time; 0 and 0xFFFFFFFF mean
/// absent.
pub fn from_wire(value: u32) -> Option<DateTime<Utc>> {
    if value == 0 || value == ABSENT {
        return None;
    }
    let raw = Utc.timestamp_opt(value as i64, 0).single()?;
    raw.checked_add_signed(chrono::Duration::seconds(shanghai_minus_local(raw)))
}

/// Build a charge id: the Shanghai calendar date followed by the supplied
/// suffix (up to 8 ASCII characters). Without a suffix the minute-precision
/// time plus four random digits is used instead, matching what the vendor
/// app generates; either way the id fits the 16-byte wire field.
pub fn make_charge_id(suffix: &str) -> ChargeId {
    let now = Utc::now().with_timezone(&Shanghai);
    if suffix.is_empty() {
        let mut rng = rand::thread_rng();
        let digits: String = (0..4)
            .map(|_| char::from(b'0' + rng.gen_range(0u8..10)))
            .collect();
        format!("{}{}", now.format("%Y%m%d%H%M"), digits)
    } else {
        let suffix: String = suffix.chars().take(8).collect();
        format!("{}{}", now.format("%Y%m%d"), suffix)
    }
}
