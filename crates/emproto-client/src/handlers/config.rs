//! Handler for configuration get/set responses.

use super::{payload_too_short, set_if_changed, EmHandler};
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{wire, Command, Datagram};
use emproto_types::{EventKind, Language, TemperatureUnit};

pub(super) struct ConfigHandler;

#[async_trait]
impl EmHandler for ConfigHandler {
    fn handles(&self) -> &'static [Command] {
        &[
            Command::SET_GET_LANGUAGE_RESPONSE,
            Command::SET_GET_NAME_RESPONSE,
            Command::SET_GET_TEMPERATURE_UNIT_RESPONSE,
            Command::SET_GET_OFFLINE_CHARGE_RESPONSE,
            Command::SET_GET_MAX_CURRENT_RESPONSE,
        ]
    }

    async fn handle(&self, evse: &Evse, datagram: &Datagram) {
        if payload_too_short(evse, datagram, 2) {
            return;
        }
        let payload = &datagram.payload;

        let mut changed = false;
        {
            let mut config = evse.config.write().await;
            match datagram.command {
                Command::SET_GET_LANGUAGE_RESPONSE => set_if_changed(
                    &mut config.language,
                    Language::from_byte(payload[1]),
                    &mut changed,
                ),
                Command::SET_GET_NAME_RESPONSE => {
                    let name = wire::read_string(&payload[1..]);
                    let name = name.strip_prefix("ACP#").unwrap_or(&name).to_string();
                    set_if_changed(&mut config.name, name, &mut changed);
                }
                Command::SET_GET_TEMPERATURE_UNIT_RESPONSE => set_if_changed(
                    &mut config.temperature_unit,
                    TemperatureUnit::from_byte(payload[1]),
                    &mut changed,
                ),
                // Inverted on the wire: 0x00 means enabled.
                Command::SET_GET_OFFLINE_CHARGE_RESPONSE => {
                    set_if_changed(&mut config.offline_charge, payload[1] == 0, &mut changed)
                }
                Command::SET_GET_MAX_CURRENT_RESPONSE => {
                    set_if_changed(&mut config.max_current, payload[1] as f32, &mut changed)
                }
                _ => {}
            }
        }

        if changed {
            evse.queue_event(EventKind::EvseConfigUpdated);
        }
    }
}
