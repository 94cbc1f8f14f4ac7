//! Handler for the version response, which carries fields the login frame
//! does not.

use super::{payload_too_short, set_if_changed, EmHandler};
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{wire, Command, Datagram};
use emproto_types::EventKind;
use tokio::time::Instant;

pub(super) struct VersionHandler;

#[async_trait]
impl EmHandler for VersionHandler {
    fn handles(&self) -> &'static [Command] {
        &[Command::GET_VERSION_RESPONSE]
    }

    async fn handle(&self, evse: &Evse, datagram: &Datagram) {
        if payload_too_short(evse, datagram, 35) {
            return;
        }
        let payload = &datagram.payload;

        let mut changed = false;
        {
            let mut info = evse.info.write().await;
            set_if_changed(
                &mut info.hardware_version,
                wire::read_string(&payload[0..16]),
                &mut changed,
            );
            set_if_changed(
                &mut info.software_version,
                wire::read_string(&payload[16..32]),
                &mut changed,
            );
            if payload.len() >= 36 {
                set_if_changed(&mut info.feature, wire::read_u32(payload, 32), &mut changed);
            }
            if payload.len() >= 37 {
                set_if_changed(&mut info.support_new, payload[36] as u32, &mut changed);
            }
        }

        evse.session.lock().unwrap().info_fetched = Some(Instant::now());

        if changed {
            evse.queue_event(EventKind::EvseInfoUpdated);
        }
    }
}
