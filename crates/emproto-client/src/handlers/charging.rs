//! Handler for the charge-session data frame, whether pushed by the EVSE
//! or requested explicitly.

use super::{payload_too_short, set_if_changed, EmHandler};
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{wire, Command, Datagram};
use emproto_types::{DeviceState, EventKind};
use tokio::time::Instant;
use tracing::warn;

pub(super) struct ChargingHandler;

#[async_trait]
impl EmHandler for ChargingHandler {
    fn handles(&self) -> &'static [Command] {
        &[
            Command::SINGLE_AC_CHARGING,
            Command::CHARGING_STATUS_RESPONSE,
        ]
    }

    async fn handle(&self, evse: &Evse, datagram: &Datagram) {
        if payload_too_short(evse, datagram, 74) {
            return;
        }
        let payload = &datagram.payload;

        let mut changed = false;
        {
            let mut charge = evse.charge.write().await;
            set_if_changed(&mut charge.port, payload[0], &mut changed);

            // The extended layout appends a charge state that supersedes
            // the legacy byte for the two codes it introduces.
            let charge_state = match payload.get(74) {
                Some(&extended) if extended == 18 || extended == 19 => extended,
                _ => payload[1],
            };
            set_if_changed(
                &mut charge.charge_state,
                DeviceState::from_byte(charge_state),
                &mut changed,
            );

            set_if_changed(
                &mut charge.charge_id,
                wire::read_string(&payload[2..18]),
                &mut changed,
            );
            set_if_changed(&mut charge.start_type, payload[18], &mut changed);
            set_if_changed(&mut charge.charge_type, payload[19], &mut changed);
            set_if_changed(
                &mut charge.max_duration,
                wire::read_duration_minutes(payload, 20),
                &mut changed,
            );
            set_if_changed(
                &mut charge.max_energy,
                wire::read_energy16(payload, 22),
                &mut changed,
            );
            set_if_changed(
                &mut charge.reservation_time,
                wire::read_timestamp(payload, 26),
                &mut changed,
            );
            set_if_changed(
                &mut charge.user_id,
                wire::read_string(&payload[30..46]),
                &mut changed,
            );
            set_if_changed(&mut charge.max_current, payload[46] as f32, &mut changed);
            set_if_changed(
                &mut charge.start_time,
                wire::read_timestamp(payload, 47),
                &mut changed,
            );
            set_if_changed(
                &mut charge.duration,
                wire::read_duration_seconds(payload, 51),
                &mut changed,
            );
            set_if_changed(
                &mut charge.start_energy_counter,
                wire::read_energy32(payload, 55).unwrap_or_default(),
                &mut changed,
            );
            set_if_changed(
                &mut charge.current_energy_counter,
                wire::read_energy32(payload, 59).unwrap_or_default(),
                &mut changed,
            );
            set_if_changed(
                &mut charge.charged_energy,
                wire::read_energy32(payload, 63).unwrap_or_default(),
                &mut changed,
            );
            set_if_changed(
                &mut charge.charge_price,
                wire::read_u32(payload, 67) as f32 * 0.01,
                &mut changed,
            );
            set_if_changed(&mut charge.fee_type, payload[71], &mut changed);
            set_if_changed(
                &mut charge.charge_fee,
                wire::read_u16(payload, 72) as f32 * 0.01,
                &mut changed,
            );
        }

        evse.session.lock().unwrap().charge_fetched = Some(Instant::now());

        let ack = Datagram::new(Command::SINGLE_AC_CHARGING_ACK, vec![0x00]);
        let ack_evse = evse.clone();
        tokio::spawn(async move {
            if let Err(err) = ack_evse.send_datagram(ack).await {
                warn!(serial = %ack_evse.serial(), %err, "failed to send charging ack");
            }
        });

        if changed {
            evse.queue_event(EventKind::EvseChargeUpdated);
        }
    }
}
