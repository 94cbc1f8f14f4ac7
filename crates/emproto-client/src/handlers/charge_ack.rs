//! No-op handler for charge start/stop responses.
//!
//! The responses are consumed by the waiters in `start_charge` and
//! `stop_charge`; this handler only claims the commands so they are not
//! reported as unhandled. A session started or stopped by another app
//! surfaces through the status handler anyway.

use super::EmHandler;
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{Command, Datagram};

pub(super) struct ChargeAckHandler;

#[async_trait]
impl EmHandler for ChargeAckHandler {
    fn handles(&self) -> &'static [Command] {
        &[Command::CHARGE_START_RESPONSE, Command::CHARGE_STOP_RESPONSE]
    }

    async fn handle(&self, _evse: &Evse, _datagram: &Datagram) {}
}
