//! Handler for login frames carrying the static device description.

use super::{payload_too_short, set_if_changed, EmHandler};
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{wire, Command, Datagram};
use emproto_types::{EventKind, Phases};

/// Device types that deliver three-phase power.
const THREE_PHASE_TYPES: &[u8] = &[10, 11, 12, 13, 14, 15, 22, 23, 24, 25];

pub(super) struct LoginInfoHandler;

#[async_trait]
impl EmHandler for LoginInfoHandler {
    fn handles(&self) -> &'static [Command] {
        &[Command::LOGIN, Command::LOGIN_RESPONSE]
    }

    async fn handle(&self, evse: &Evse, datagram: &Datagram) {
        if payload_too_short(evse, datagram, 54) {
            return;
        }
        let payload = &datagram.payload;

        let mut changed = false;
        {
            let mut info = evse.info.write().await;
            set_if_changed(&mut info.evse_type, payload[0], &mut changed);

            // Brand and model each span a second 16-byte region in the
            // extended layout.
            let mut brand = wire::read_string(&payload[1..17]);
            let mut model = wire::read_string(&payload[17..33]);
            if payload.len() >= 151 {
                brand.push_str(&wire::read_string(&payload[119..135]));
                model.push_str(&wire::read_string(&payload[135..151]));
            }
            set_if_changed(&mut info.brand, brand, &mut changed);
            set_if_changed(&mut info.model, model, &mut changed);

            set_if_changed(
                &mut info.hardware_version,
                wire::read_string(&payload[33..49]),
                &mut changed,
            );
            set_if_changed(&mut info.max_power, wire::read_u32(payload, 49), &mut changed);
            set_if_changed(&mut info.max_current, payload[53] as f32, &mut changed);

            let phases = if THREE_PHASE_TYPES.contains(&info.evse_type) {
                Phases::Three
            } else {
                Phases::One
            };
            set_if_changed(&mut info.phases, phases, &mut changed);

            let byte70 = if payload.len() >= 119 && THREE_PHASE_TYPES.contains(&info.evse_type) {
                payload[70]
            } else {
                0
            };
            set_if_changed(&mut info.byte70, byte70, &mut changed);
        }

        if changed {
            evse.queue_event(EventKind::EvseInfoUpdated);
        }
    }
}
