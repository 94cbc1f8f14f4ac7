//! Start/stop charge control and the charge-data fetch.

use super::{Evse, RESPONSE_TIMEOUT};
use emproto_codec::{time, wire, Command, Datagram};
use emproto_types::{
    ChargeStartParams, ChargeStartReason, ChargeStartResult, ChargeStopParams, ChargeStopReason,
    ChargeStopResult, EmError, EmResult, EvseConfig, EvseInfo, UserId,
};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

impl Evse {
    /// Start a charge session.
    ///
    /// Failures are reported through the result's reason code; preflight
    /// failures (offline, not logged in) are synthesized without any
    /// network round trip. A `NoConfirmation` outcome means no response
    /// arrived in time, not that the start necessarily failed.
    pub async fn start_charge(&self, params: ChargeStartParams) -> ChargeStartResult {
        if !self.is_online() {
            return ChargeStartResult::failed(ChargeStartReason::EvseOffline);
        }
        if !self.is_logged_in() {
            return ChargeStartResult::failed(ChargeStartReason::EvseNotLoggedIn);
        }

        let info = self.info.read().await.clone();
        let config = self.config.read().await.clone();
        let payload = charge_start_payload(&params, &info, &config, &self.shared.app_name);

        if let Err(err) = self
            .send_datagram(Datagram::new(Command::CHARGE_START, payload.to_vec()))
            .await
        {
            warn!(serial = %self.serial(), %err, "failed to send charge start");
            return ChargeStartResult::failed(ChargeStartReason::SendFailed);
        }

        let response = match self
            .wait_for(RESPONSE_TIMEOUT, &[Command::CHARGE_START_RESPONSE])
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(serial = %self.serial(), %err, "no charge start confirmation");
                return ChargeStartResult::failed(ChargeStartReason::NoConfirmation);
            }
        };
        if response.payload.len() < 5 {
            warn!(serial = %self.serial(), command = %response.command,
                "charge start response too short");
            return ChargeStartResult::failed(ChargeStartReason::NoConfirmation);
        }

        let reason = ChargeStartReason::from_byte(response.payload[3]);
        if reason != ChargeStartReason::Ok {
            return ChargeStartResult::failed(reason);
        }
        ChargeStartResult {
            reason: ChargeStartReason::Ok,
            line_id: response.payload[0],
            current: response.payload[4],
        }
    }

    /// Stop the current charge session or cancel a planned one.
    pub async fn stop_charge(&self, params: ChargeStopParams) -> ChargeStopResult {
        if !self.is_online() {
            return ChargeStopResult::failed(ChargeStopReason::EvseOffline);
        }
        if !self.is_logged_in() {
            return ChargeStopResult::failed(ChargeStopReason::EvseNotLoggedIn);
        }

        let mut payload = [0u8; 47];
        payload[0] = if params.line_id == 0 { 1 } else { params.line_id };
        let user_id = if params.user_id.is_empty() {
            self.shared.app_name.clone()
        } else {
            params.user_id.clone()
        };
        wire::write_user_id(&mut payload[1..17], &user_id);

        if let Err(err) = self
            .send_datagram(Datagram::new(Command::CHARGE_STOP, payload.to_vec()))
            .await
        {
            warn!(serial = %self.serial(), %err, "failed to send charge stop");
            return ChargeStopResult::failed(ChargeStopReason::SendFailed);
        }

        // Some firmware answers a stop on the start-response code, so
        // accept either; the stop layout is parsed from whichever arrives.
        let response = match self
            .wait_for(
                RESPONSE_TIMEOUT,
                &[Command::CHARGE_STOP_RESPONSE, Command::CHARGE_START_RESPONSE],
            )
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(serial = %self.serial(), %err, "no charge stop confirmation");
                return ChargeStopResult::failed(ChargeStopReason::NoConfirmation);
            }
        };
        if response.payload.len() < 5 {
            warn!(serial = %self.serial(), command = %response.command,
                "charge stop response too short");
            return ChargeStopResult::failed(ChargeStopReason::NoConfirmation);
        }

        let reason = ChargeStopReason::from_byte(response.payload[2]);
        if reason != ChargeStopReason::Ok {
            return ChargeStopResult::failed(reason);
        }
        ChargeStopResult {
            reason: ChargeStopReason::Ok,
            line_id: response.payload[0],
        }
    }

    /// Fetch charge-session data unless it was fetched less than `max_age`
    /// ago. The response is applied by the charging handler.
    pub async fn fetch_charge(&self, max_age: Duration) -> EmResult<()> {
        {
            let session = self.session.lock().unwrap();
            if let Some(fetched) = session.charge_fetched {
                if fetched.elapsed() < max_age {
                    return Ok(());
                }
            }
        }
        if !self.is_logged_in() {
            return Err(EmError::NotLoggedIn {
                serial: self.serial().clone(),
            });
        }
        self.send_datagram(Datagram::new(Command::REQUEST_CHARGING_STATUS, vec![0x00]))
            .await?;
        self.wait_for(RESPONSE_TIMEOUT, &[Command::CHARGING_STATUS_RESPONSE])
            .await?;
        Ok(())
    }
}

/// Build the 47-byte charge-start payload.
///
/// The requested current is clamped to at least 6 A and at most the
/// hardware maximum, then capped by the configured maximum; unknown (zero)
/// limits are skipped rather than clamping everything to the floor.
pub(crate) fn charge_start_payload(
    params: &ChargeStartParams,
    info: &EvseInfo,
    config: &EvseConfig,
    app_name: &UserId,
) -> [u8; 47] {
    let now = Utc::now();

    let mut line_id = 2u8;
    let mut charge_type = 1u8;
    if params.force_single_phase {
        if info.can_force_single_phase() {
            line_id = 1;
            charge_type = 11;
        } else {
            warn!(serial = %info.serial,
                "single-phase charging requested but not supported, using all available phases");
        }
    }

    let mut max_current = params.max_current;
    if info.max_current > 0.0 {
        max_current = max_current.min(info.max_current);
    }
    if max_current < 6.0 {
        max_current = 6.0;
    }
    if config.max_current > 0.0 {
        max_current = max_current.min(config.max_current);
    }

    let user_id = if params.user_id.is_empty() {
        app_name.clone()
    } else {
        params.user_id.clone()
    };
    let charge_id = time::make_charge_id(&params.charge_id);

    let mut start_at = now;
    let mut is_reservation = 0u8;
    if let Some(at) = params.start_at {
        if at.timestamp() > 0 {
            start_at = at;
            if at > now + chrono::Duration::seconds(5) {
                is_reservation = 1;
            }
        }
    }

    let mut payload = [0u8; 47];
    payload[0] = line_id;
    wire::write_user_id(&mut payload[1..17], &user_id);
    let id_bytes = charge_id.as_bytes();
    let id_len = id_bytes.len().min(16);
    payload[17..17 + id_len].copy_from_slice(&id_bytes[..id_len]);
    payload[33] = is_reservation;
    wire::write_u32(&mut payload, 34, time::to_wire(Some(start_at)));
    payload[38] = 1; // start type
    payload[39] = charge_type;
    match params.max_duration {
        Some(limit) if !limit.is_zero() => {
            wire::write_u16(&mut payload, 40, ((limit.as_secs() / 60).max(1)) as u16)
        }
        _ => wire::write_u16(&mut payload, 40, 0xFFFF),
    }
    match params.max_energy {
        Some(limit) if limit > 0.0 => wire::write_u16(&mut payload, 42, (limit * 100.0) as u16),
        _ => wire::write_u16(&mut payload, 42, 0xFFFF),
    }
    // Anything but 0xFFFF here makes the EVSE end the session within
    // seconds, before the car draws any current.
    wire::write_u16(&mut payload, 44, 0xFFFF);
    payload[46] = max_current as u8;
    payload
}
