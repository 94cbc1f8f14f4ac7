//! Per-EVSE state model: static info, live electrical state, charge-session
//! data and mutable configuration, plus the enums their fields are drawn
//! from. Fields use SI units; raw wire scalings stay inside the codec and
//! handlers.

use crate::{Amps, Celsius, ChargeId, KWh, LineId, Serial, UserId, Volts, Watts};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Number of phases an EVSE can deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phases {
    #[default]
    One,
    Three,
}

impl Phases {
    pub fn count(&self) -> u8 {
        match self {
            Phases::One => 1,
            Phases::Three => 3,
        }
    }
}

/// High-level EVSE status derived from the liveness windows and the four
/// state sections, evaluated in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaState {
    /// Not active on the network in the last few seconds.
    Offline,
    /// Online but the communicator is not logged in.
    NotLoggedIn,
    /// Online and logged in, but one or more errors are present.
    Error,
    /// Online, logged in, and currently delivering power.
    Charging,
    /// Online, logged in, a car is plugged in but not charging.
    PluggedIn,
    /// Online, logged in, no errors, no car plugged in.
    Idle,
}

impl std::fmt::Display for MetaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MetaState::Offline => "Offline",
            MetaState::NotLoggedIn => "NotLoggedIn",
            MetaState::Error => "Error",
            MetaState::Charging => "Charging",
            MetaState::PluggedIn => "PluggedIn",
            MetaState::Idle => "Idle",
        };
        write!(f, "{s}")
    }
}

/// Charging-gun (plug) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GunState {
    NotConnected,
    ConnectedUnlocked,
    ConnectedLocked,
    Other(u8),
}

impl GunState {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => GunState::NotConnected,
            2 => GunState::ConnectedUnlocked,
            4 => GunState::ConnectedLocked,
            other => GunState::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            GunState::NotConnected => 1,
            GunState::ConnectedUnlocked => 2,
            GunState::ConnectedLocked => 4,
            GunState::Other(b) => *b,
        }
    }

    /// Whether a cable is physically present (any state past NotConnected).
    pub fn is_connected(&self) -> bool {
        self.as_byte() > 1
    }
}

impl Default for GunState {
    fn default() -> Self {
        GunState::Other(0)
    }
}

/// Relay output state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputState {
    Charging,
    Idle,
    Other(u8),
}

impl OutputState {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => OutputState::Charging,
            2 => OutputState::Idle,
            other => OutputState::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            OutputState::Charging => 1,
            OutputState::Idle => 2,
            OutputState::Other(b) => *b,
        }
    }
}

impl Default for OutputState {
    fn default() -> Self {
        OutputState::Other(0)
    }
}

/// Detailed device state reported in status and charging frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    Fault,
    WaitingForSwipe,
    WaitingForButton,
    NotConnected,
    ReadyToCharge,
    Charging,
    Completed,
    FullyCharged,
    ReservationActive,
    Other(u8),
}

impl DeviceState {
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => DeviceState::Fault,
            10 => DeviceState::WaitingForSwipe,
            11 => DeviceState::WaitingForButton,
            12 => DeviceState::NotConnected,
            13 => DeviceState::ReadyToCharge,
            14 => DeviceState::Charging,
            15 => DeviceState::Completed,
            17 => DeviceState::FullyCharged,
            20 => DeviceState::ReservationActive,
            other => DeviceState::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            DeviceState::Fault => 1,
            DeviceState::WaitingForSwipe => 10,
            DeviceState::WaitingForButton => 11,
            DeviceState::NotConnected => 12,
            DeviceState::ReadyToCharge => 13,
            DeviceState::Charging => 14,
            DeviceState::Completed => 15,
            DeviceState::FullyCharged => 17,
            DeviceState::ReservationActive => 20,
            DeviceState::Other(b) => *b,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::Other(0)
    }
}

/// EVSE error condition, one per bit of the 32-bit error bitmap in status
/// frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvseError {
    RelayStickL1,
    RelayStickL2,
    RelayStickL3,
    Offline,
    CcError,
    CpError,
    EmergencyStop,
    OverTemperatureInner,
    OverTemperatureOuter,
    LeakageProtection,
    ShortCircuit,
    OverCurrent,
    Ungrounded,
    OverVoltage,
    LowVoltage,
    InputPower,
    MainsOverload,
    DiodeShortCircuit,
    RtcFailure,
    FlashMemoryFailure,
    EepromFailure,
    MeteringModuleFailure,
    Other(u8),
}

impl EvseError {
    /// Map a bit index of the wire bitmap to an error condition.
    pub fn from_bit(bit: u8) -> Self {
        match bit {
            0 => EvseError::RelayStickL1,
            1 => EvseError::RelayStickL2,
            2 => EvseError::RelayStickL3,
            3 => EvseError::Offline,
            4 => EvseError::CcError,
            5 => EvseError::CpError,
            6 => EvseError::EmergencyStop,
            7 => EvseError::OverTemperatureInner,
            8 => EvseError::OverTemperatureOuter,
            10 => EvseError::LeakageProtection,
            11 => EvseError::ShortCircuit,
            12 => EvseError::OverCurrent,
            13 => EvseError::Ungrounded,
            14 => EvseError::OverVoltage,
            15 => EvseError::LowVoltage,
            25 => EvseError::InputPower,
            26 => EvseError::MainsOverload,
            27 => EvseError::DiodeShortCircuit,
            28 => EvseError::RtcFailure,
            29 => EvseError::FlashMemoryFailure,
            30 => EvseError::EepromFailure,
            31 => EvseError::MeteringModuleFailure,
            other => EvseError::Other(other),
        }
    }

    /// Expand an error bitmap into the set of conditions it encodes.
    pub fn set_from_bitmap(bitmap: u32) -> BTreeSet<EvseError> {
        (0..32u8)
            .filter(|bit| bitmap & (1 << bit) != 0)
            .map(EvseError::from_bit)
            .collect()
    }
}

/// Display language configured on the EVSE.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    Unknown,
    English,
    Italian,
    German,
    French,
    Spanish,
    Hebrew,
    Other(u8),
}

impl Language {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => Language::Unknown,
            1 => Language::English,
            2 => Language::Italian,
            3 => Language::German,
            4 => Language::French,
            5 => Language::Spanish,
            6 => Language::Hebrew,
            other => Language::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Language::Unknown => 0,
            Language::English => 1,
            Language::Italian => 2,
            Language::German => 3,
            Language::French => 4,
            Language::Spanish => 5,
            Language::Hebrew => 6,
            Language::Other(b) => *b,
        }
    }
}

/// Temperature unit used by the EVSE display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    Unknown,
    Celsius,
    Fahrenheit,
    Other(u8),
}

impl TemperatureUnit {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0 => TemperatureUnit::Unknown,
            1 => TemperatureUnit::Celsius,
            2 => TemperatureUnit::Fahrenheit,
            other => TemperatureUnit::Other(other),
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            TemperatureUnit::Unknown => 0,
            TemperatureUnit::Celsius => 1,
            TemperatureUnit::Fahrenheit => 2,
            TemperatureUnit::Other(b) => *b,
        }
    }
}

/// Raw emergency-button state byte; semantics beyond "pressed at all" are
/// device specific.
pub type EmergencyButtonState = u8;

/// Static information about an EVSE, populated by the login and version
/// exchanges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvseInfo {
    pub serial: Serial,
    pub brand: String,
    pub model: String,
    pub hardware_version: String,
    pub software_version: String,
    /// Device type code; some feature availability depends on it.
    pub evse_type: u8,
    pub phases: Phases,
    /// Maximum power the EVSE can deliver, in watts.
    pub max_power: Watts,
    /// Maximum current the EVSE can deliver on each phase, in amperes.
    pub max_current: Amps,
    /// Feature bitmap; individual bit meanings are not documented.
    pub feature: u32,
    /// Extended feature byte; meaning not documented.
    pub support_new: u32,
    /// Byte at offset 70 of the extended login payload; feeds into
    /// [`EvseInfo::can_force_single_phase`].
    pub byte70: u8,
}

impl EvseInfo {
    pub fn new(serial: Serial) -> Self {
        EvseInfo {
            serial,
            ..Default::default()
        }
    }

    /// Whether the EVSE supports forcing single-phase charging on a
    /// three-phase connection.
    pub fn can_force_single_phase(&self) -> bool {
        (22..=25).contains(&self.evse_type) && self.byte70 < 11
    }
}

/// Live electrical state of an EVSE, updated on every status frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvseState {
    pub line_id: LineId,
    pub l1_voltage: Volts,
    pub l1_current: Amps,
    pub l2_voltage: Volts,
    pub l2_current: Amps,
    pub l3_voltage: Volts,
    pub l3_current: Amps,
    /// Present output power in watts; the larger of the reported value and
    /// the per-phase V*A sum.
    pub current_power: Watts,
    /// Lifetime energy counter in kWh.
    pub energy_counter: KWh,
    pub inner_temp: Celsius,
    pub outer_temp: Celsius,
    pub emergency_button: EmergencyButtonState,
    pub gun_state: GunState,
    pub output_state: OutputState,
    pub device_state: DeviceState,
    pub errors: BTreeSet<EvseError>,
    /// True when the EVSE sends the extended status layout.
    pub new_protocol: bool,
}

/// Data about the current, planned or most recent charge session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvseCharge {
    pub port: u8,
    pub charge_state: DeviceState,
    pub charge_id: ChargeId,
    pub start_type: u8,
    pub charge_type: u8,
    pub max_duration: Option<Duration>,
    pub max_energy: Option<KWh>,
    pub reservation_time: Option<DateTime<Utc>>,
    pub user_id: UserId,
    pub max_current: Amps,
    pub start_time: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub start_energy_counter: KWh,
    pub current_energy_counter: KWh,
    pub charged_energy: KWh,
    pub charge_price: f32,
    pub fee_type: u8,
    pub charge_fee: f32,
}

/// Mutable configuration stored on the EVSE.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvseConfig {
    /// Configured display name; empty until fetched.
    pub name: String,
    pub language: Language,
    pub temperature_unit: TemperatureUnit,
    /// Whether a charge can be started at the EVSE itself (button, screen
    /// or card) without this library.
    pub offline_charge: bool,
    /// Configured maximum current in amperes; 0 until fetched.
    pub max_current: Amps,
}
