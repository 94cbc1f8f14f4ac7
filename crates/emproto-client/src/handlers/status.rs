//! Handler for the periodic SingleACStatus frame: live electrical state,
//! temperatures, gun/output/device state and the error bitmap.

use super::{payload_too_short, set_if_changed, EmHandler};
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{wire, Command, Datagram};
use emproto_types::{
    DeviceState, EventKind, EvseError, GunState, MetaState, OutputState, Watts,
};
use tracing::warn;

pub(super) struct StatusHandler;

#[async_trait]
impl EmHandler for StatusHandler {
    fn handles(&self) -> &'static [Command] {
        &[Command::SINGLE_AC_STATUS]
    }

    async fn handle(&self, evse: &Evse, datagram: &Datagram) {
        if payload_too_short(evse, datagram, 25) {
            return;
        }
        let payload = &datagram.payload;

        let old_meta = evse.meta_state().await;
        let mut changed = false;
        {
            let mut state = evse.state.write().await;
            set_if_changed(&mut state.line_id, payload[0], &mut changed);

            set_if_changed(&mut state.l1_voltage, wire::read_voltage(payload, 1), &mut changed);
            set_if_changed(&mut state.l1_current, wire::read_current(payload, 3), &mut changed);

            // L2 and L3 are only present in the extended layout.
            let (l2v, l2c, l3v, l3c) = if payload.len() >= 33 {
                (
                    wire::read_voltage(payload, 25),
                    wire::read_current(payload, 27),
                    wire::read_voltage(payload, 29),
                    wire::read_current(payload, 31),
                )
            } else {
                (0.0, 0.0, 0.0, 0.0)
            };
            set_if_changed(&mut state.l2_voltage, l2v, &mut changed);
            set_if_changed(&mut state.l2_current, l2c, &mut changed);
            set_if_changed(&mut state.l3_voltage, l3v, &mut changed);
            set_if_changed(&mut state.l3_current, l3c, &mut changed);

            // Some firmware under-reports total power; trust the per-phase
            // figures when their sum is larger.
            let reported = wire::read_u32(payload, 5) as f64;
            let computed = state.l1_voltage as f64 * state.l1_current as f64
                + state.l2_voltage as f64 * state.l2_current as f64
                + state.l3_voltage as f64 * state.l3_current as f64;
            set_if_changed(
                &mut state.current_power,
                reported.max(computed) as Watts,
                &mut changed,
            );

            set_if_changed(
                &mut state.energy_counter,
                wire::read_u32(payload, 9) as f64 * 0.01,
                &mut changed,
            );
            set_if_changed(&mut state.inner_temp, wire::read_temperature(payload, 13), &mut changed);
            set_if_changed(&mut state.outer_temp, wire::read_temperature(payload, 15), &mut changed);
            set_if_changed(&mut state.emergency_button, payload[17], &mut changed);
            set_if_changed(&mut state.gun_state, GunState::from_byte(payload[18]), &mut changed);
            set_if_changed(
                &mut state.output_state,
                OutputState::from_byte(payload[19]),
                &mut changed,
            );
            set_if_changed(&mut state.new_protocol, payload.len() > 33, &mut changed);

            // The extended layout can override the device state with the
            // two codes the short byte cannot express.
            let mut device_state = payload[20];
            if state.new_protocol && payload.len() > 34 {
                let extended = payload[34];
                if extended == 18 || extended == 19 {
                    device_state = extended;
                }
            }
            set_if_changed(
                &mut state.device_state,
                DeviceState::from_byte(device_state),
                &mut changed,
            );

            let errors = EvseError::set_from_bitmap(wire::read_u32(payload, 21));
            set_if_changed(&mut state.errors, errors, &mut changed);
        }

        let ack = Datagram::new(Command::SINGLE_AC_STATUS_ACK, vec![0x01]);
        let ack_evse = evse.clone();
        tokio::spawn(async move {
            if let Err(err) = ack_evse.send_datagram(ack).await {
                warn!(serial = %ack_evse.serial(), %err, "failed to send status ack");
            }
        });

        if changed {
            evse.queue_event(EventKind::EvseStateUpdated);
        }
        let new_meta = evse.meta_state().await;
        if old_meta != MetaState::Charging && new_meta == MetaState::Charging {
            evse.queue_event(EventKind::EvseChargeStarted);
        } else if old_meta == MetaState::Charging && new_meta != MetaState::Charging {
            evse.queue_event(EventKind::EvseChargeStopped);
        }
    }
}
