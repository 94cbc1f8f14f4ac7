//! Command codes of the EM protocol.
//!
//! Commands sent by the EVSE use codes below 0x8000; the matching
//! client-to-EVSE direction sets the high bit. For the configuration
//! get/set pairs the response code is always the request code minus 0x8000.

use serde::{Deserialize, Serialize};

/// A 16-bit command code. Unknown codes stay representable so that frames
/// from newer firmware still decode and reach the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(pub u16);

impl Command {
    pub const LOGIN: Command = Command(0x0001);
    pub const LOGIN_RESPONSE: Command = Command(0x0002);
    pub const LOGIN_CONFIRM: Command = Command(0x8001);
    pub const REQUEST_LOGIN: Command = Command(0x8002);
    pub const PASSWORD_ERROR: Command = Command(0x0155);

    pub const HEADING: Command = Command(0x0003);
    pub const HEADING_RESPONSE: Command = Command(0x8003);

    /// Sent by the EVSE unsolicited, periodically, while online.
    pub const SINGLE_AC_STATUS: Command = Command(0x0004);
    pub const SINGLE_AC_STATUS_ACK: Command = Command(0x8004);

    /// Sent by the EVSE unsolicited, periodically, while logged in.
    pub const SINGLE_AC_CHARGING: Command = Command(0x0005);
    pub const SINGLE_AC_CHARGING_ACK: Command = Command(0x8005);
    /// Client-initiated request for the same data as SINGLE_AC_CHARGING.
    pub const REQUEST_CHARGING_STATUS: Command = Command(0x8006);
    /// Response to REQUEST_CHARGING_STATUS; same payload layout as
    /// SINGLE_AC_CHARGING.
    pub const CHARGING_STATUS_RESPONSE: Command = Command(0x0006);

    /// Version info; carries fields the login payload does not.
    pub const GET_VERSION: Command = Command(0x8106);
    pub const GET_VERSION_RESPONSE: Command = Command(0x0106);

    pub const SET_GET_LANGUAGE: Command = Command(0x810F);
    pub const SET_GET_LANGUAGE_RESPONSE: Command = Command(0x010F);
    pub const SET_GET_NAME: Command = Command(0x8108);
    pub const SET_GET_NAME_RESPONSE: Command = Command(0x0108);
    pub const SET_GET_OFFLINE_CHARGE: Command = Command(0x810D);
    pub const SET_GET_OFFLINE_CHARGE_RESPONSE: Command = Command(0x010D);
    pub const SET_GET_MAX_CURRENT: Command = Command(0x8107);
    pub const SET_GET_MAX_CURRENT_RESPONSE: Command = Command(0x0107);
    pub const SET_GET_TEMPERATURE_UNIT: Command = Command(0x8112);
    pub const SET_GET_TEMPERATURE_UNIT_RESPONSE: Command = Command(0x0112);

    pub const CHARGE_START: Command = Command(0x8007);
    pub const CHARGE_START_RESPONSE: Command = Command(0x0007);
    pub const CHARGE_STOP: Command = Command(0x8008);
    pub const CHARGE_STOP_RESPONSE: Command = Command(0x0008);

    /// The response code paired with a client request code.
    pub fn response(self) -> Command {
        Command(self.0.wrapping_sub(0x8000))
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Command::LOGIN => "Login",
            Command::LOGIN_RESPONSE => "LoginResponse",
            Command::LOGIN_CONFIRM => "LoginConfirm",
            Command::REQUEST_LOGIN => "RequestLogin",
            Command::PASSWORD_ERROR => "PasswordError",
            Command::HEADING => "Heading",
            Command::HEADING_RESPONSE => "HeadingResponse",
            Command::SINGLE_AC_STATUS => "SingleAcStatus",
            Command::SINGLE_AC_STATUS_ACK => "SingleAcStatusAck",
            Command::SINGLE_AC_CHARGING => "SingleAcCharging",
            Command::SINGLE_AC_CHARGING_ACK => "SingleAcChargingAck",
            Command::REQUEST_CHARGING_STATUS => "RequestChargingStatus",
            Command::CHARGING_STATUS_RESPONSE => "ChargingStatusResponse",
            Command::GET_VERSION => "GetVersion",
            Command::GET_VERSION_RESPONSE => "GetVersionResponse",
            Command::SET_GET_LANGUAGE => "SetGetLanguage",
            Command::SET_GET_LANGUAGE_RESPONSE => "SetGetLanguageResponse",
            Command::SET_GET_NAME => "SetGetName",
            Command::SET_GET_NAME_RESPONSE => "SetGetNameResponse",
            Command::SET_GET_OFFLINE_CHARGE => "SetGetOfflineCharge",
            Command::SET_GET_OFFLINE_CHARGE_RESPONSE => "SetGetOfflineChargeResponse",
            Command::SET_GET_MAX_CURRENT => "SetGetMaxCurrent",
            Command::SET_GET_MAX_CURRENT_RESPONSE => "SetGetMaxCurrentResponse",
            Command::SET_GET_TEMPERATURE_UNIT => "SetGetTemperatureUnit",
            Command::SET_GET_TEMPERATURE_UNIT_RESPONSE => "SetGetTemperatureUnitResponse",
            Command::CHARGE_START => "ChargeStart",
            Command::CHARGE_START_RESPONSE => "ChargeStartResponse",
            Command::CHARGE_STOP => "ChargeStop",
            Command::CHARGE_STOP_RESPONSE => "ChargeStopResponse",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:04x}:{}", self.0, name),
            None => write!(f, "0x{:04x}", self.0),
        }
    }
}

impl Default for Command {
    fn default() -> Self {
        Command(0)
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        Command(code)
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> Self {
        command.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_code_pairing() {
        assert_eq!(Command::SET_GET_NAME.response(), Command::SET_GET_NAME_RESPONSE);
        assert_eq!(
            Command::SET_GET_LANGUAGE.response(),
            Command::SET_GET_LANGUAGE_RESPONSE
        );
        assert_eq!(Command::CHARGE_START.response(), Command::CHARGE_START_RESPONSE);
        assert_eq!(Command::GET_VERSION.response(), Command::GET_VERSION_RESPONSE);
    }

    #[test]
    fn display_includes_name_when_known() {
        assert_eq!(Command::CHARGE_START.to_string(), "0x8007:ChargeStart");
        assert_eq!(Command(0x4242).to_string(), "0x4242");
    }
}
