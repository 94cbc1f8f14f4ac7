//! Parameters and results for starting and stopping charge sessions.

use crate::{Amps, KWh, LineId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters for starting a charge session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeStartParams {
    /// Maximum current for this session, in amperes. Clamped between 6 A and
    /// the EVSE's hardware maximum, then capped by the configured maximum
    /// when one is known; out-of-range values are adjusted, not rejected.
    pub max_current: Amps,
    /// Request single-phase charging on a three-phase EVSE. Ignored with a
    /// warning when the EVSE does not support it.
    pub force_single_phase: bool,
    /// Caller-supplied charge-id suffix, maximum 8 ASCII characters
    /// (truncated if longer). The full charge id gets a date prefix.
    pub charge_id: String,
    /// Identifier of the user starting the charge; defaults to the
    /// communicator's application name when empty.
    pub user_id: UserId,
    /// Delayed start time. `None` or a time in the past starts immediately;
    /// more than 5 seconds in the future creates a reservation.
    pub start_at: Option<DateTime<Utc>>,
    /// Session duration limit. `None` means unlimited.
    pub max_duration: Option<Duration>,
    /// Session energy limit in kWh. `None` means unlimited.
    pub max_energy: Option<KWh>,
}

/// Outcome of a charge-start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeStartResult {
    pub reason: ChargeStartReason,
    /// Line the session was started on; only meaningful on success.
    pub line_id: LineId,
    /// Current assigned by the EVSE, in whole amperes; only meaningful on
    /// success.
    pub current: u8,
}

impl ChargeStartResult {
    pub fn failed(reason: ChargeStartReason) -> Self {
        ChargeStartResult {
            reason,
            line_id: 0,
            current: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.reason == ChargeStartReason::Ok
    }
}

/// Reason code of a charge-start outcome. Codes up to 20 come from the
/// protocol; 160 and up are synthesized by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeStartReason {
    Ok,
    PlugNotProperlyInserted,
    SystemError,
    AlreadyCharging,
    SystemMaintenance,
    IncorrectSetFee,
    IncorrectSetPowerConsumption,
    IncorrectSetTime,
    AlreadyReserved,
    EvseOffline,
    EvseNotLoggedIn,
    SendFailed,
    NoConfirmation,
    Unknown,
    Other(u8),
}

impl ChargeStartReason {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => ChargeStartReason::Ok,
            1 => ChargeStartReason::PlugNotProperlyInserted,
            2 => ChargeStartReason::SystemError,
            3 => ChargeStartReason::AlreadyCharging,
            4 => ChargeStartReason::SystemMaintenance,
            5 => ChargeStartReason::IncorrectSetFee,
            6 => ChargeStartReason::IncorrectSetPowerConsumption,
            7 => ChargeStartReason::IncorrectSetTime,
            20 => ChargeStartReason::AlreadyReserved,
            160 => ChargeStartReason::EvseOffline,
            161 => ChargeStartReason::EvseNotLoggedIn,
            162 => ChargeStartReason::SendFailed,
            163 => ChargeStartReason::NoConfirmation,
            255 => ChargeStartReason::Unknown,
            other => ChargeStartReason::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ChargeStartReason::Ok => 0,
            ChargeStartReason::PlugNotProperlyInserted => 1,
            ChargeStartReason::SystemError => 2,
            ChargeStartReason::AlreadyCharging => 3,
            ChargeStartReason::SystemMaintenance => 4,
            ChargeStartReason::IncorrectSetFee => 5,
            ChargeStartReason::IncorrectSetPowerConsumption => 6,
            ChargeStartReason::IncorrectSetTime => 7,
            ChargeStartReason::AlreadyReserved => 20,
            ChargeStartReason::EvseOffline => 160,
            ChargeStartReason::EvseNotLoggedIn => 161,
            ChargeStartReason::SendFailed => 162,
            ChargeStartReason::NoConfirmation => 163,
            ChargeStartReason::Unknown => 255,
            ChargeStartReason::Other(b) => *b,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ChargeStartReason::Ok => "No error",
            ChargeStartReason::PlugNotProperlyInserted => {
                "The charging plug is not plugged in properly"
            }
            ChargeStartReason::SystemError => "System error",
            ChargeStartReason::AlreadyCharging => "Already currently charging",
            ChargeStartReason::SystemMaintenance => "System maintenance",
            ChargeStartReason::IncorrectSetFee => "Incorrect set fee",
            ChargeStartReason::IncorrectSetPowerConsumption => "Incorrect set power consumption",
            ChargeStartReason::IncorrectSetTime => "Incorrect set time",
            ChargeStartReason::AlreadyReserved => "Charging reservation already active",
            ChargeStartReason::EvseOffline => "EVSE is offline",
            ChargeStartReason::EvseNotLoggedIn => "EVSE is not logged in",
            ChargeStartReason::SendFailed => "Failed to send start command to EVSE",
            ChargeStartReason::NoConfirmation => {
                "No confirmation received from EVSE (charge could still have started)"
            }
            ChargeStartReason::Unknown | ChargeStartReason::Other(_) => "Unknown reason",
        }
    }
}

impl std::fmt::Display for ChargeStartReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_byte())
    }
}

/// Parameters for stopping a charge session or cancelling a planned one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeStopParams {
    /// Line to stop; 0 selects the default line.
    pub line_id: LineId,
    /// Identifier of the user stopping the charge; defaults to the
    /// communicator's application name when empty.
    pub user_id: UserId,
}

/// Outcome of a charge-stop request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeStopResult {
    pub reason: ChargeStopReason,
    /// Line the session was stopped on; only meaningful on success.
    pub line_id: LineId,
}

impl ChargeStopResult {
    pub fn failed(reason: ChargeStopReason) -> Self {
        ChargeStopResult { reason, line_id: 0 }
    }

    pub fn is_ok(&self) -> bool {
        self.reason == ChargeStopReason::Ok
    }
}

/// Reason code of a charge-stop outcome. Only 0 is known to come from the
/// protocol; 160 and up are synthesized by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeStopReason {
    Ok,
    EvseOffline,
    EvseNotLoggedIn,
    SendFailed,
    NoConfirmation,
    Unknown,
    Other(u8),
}

impl ChargeStopReason {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => ChargeStopReason::Ok,
            160 => ChargeStopReason::EvseOffline,
            161 => ChargeStopReason::EvseNotLoggedIn,
            162 => ChargeStopReason::SendFailed,
            163 => ChargeStopReason::NoConfirmation,
            255 => ChargeStopReason::Unknown,
            other => ChargeStopReason::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ChargeStopReason::Ok => 0,
            ChargeStopReason::EvseOffline => 160,
            ChargeStopReason::EvseNotLoggedIn => 161,
            ChargeStopReason::SendFailed => 162,
            ChargeStopReason::NoConfirmation => 163,
            ChargeStopReason::Unknown => 255,
            ChargeStopReason::Other(b) => *b,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ChargeStopReason::Ok => "No error",
            ChargeStopReason::EvseOffline => "EVSE is offline",
            ChargeStopReason::EvseNotLoggedIn => "EVSE is not logged in",
            ChargeStopReason::SendFailed => "Failed to send stop command to EVSE",
            ChargeStopReason::NoConfirmation => {
                "No confirmation received from EVSE (charge could still have stopped)"
            }
            ChargeStopReason::Unknown | ChargeStopReason::Other(_) => "Unknown reason",
        }
    }
}

impl std::fmt::Display for ChargeStopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message(), self.as_byte())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_reason_byte_roundtrip() {
        for b in 0..=255u8 {
            assert_eq!(ChargeStartReason::from_byte(b).as_byte(), b);
        }
    }

    #[test]
    fn stop_reason_byte_roundtrip() {
        for b in 0..=255u8 {
            assert_eq!(ChargeStopReason::from_byte(b).as_byte(), b);
        }
    }

    #[test]
    fn reasons_have_messages() {
        assert_eq!(ChargeStartReason::Ok.message(), "No error");
        assert!(ChargeStartReason::NoConfirmation
            .message()
            .contains("could still have started"));
        assert_eq!(
            ChargeStartReason::Other(42).to_string(),
            "Unknown reason (42)"
        );
    }

    #[test]
    fn result_helpers() {
        let ok = ChargeStartResult {
            reason: ChargeStartReason::Ok,
            line_id: 2,
            current: 16,
        };
        assert!(ok.is_ok());

        let failed = ChargeStartResult::failed(ChargeStartReason::EvseOffline);
        assert!(!failed.is_ok());
        assert_eq!(failed.line_id, 0);
    }
}
