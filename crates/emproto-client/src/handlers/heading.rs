//! Handler for the periodic Heading keep-alive.
//!
//! Answering a heading is what keeps the login session alive: the login
//! window is refreshed only after the response was actually sent.

use super::EmHandler;
use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{Command, Datagram};
use tokio::time::Instant;
use tracing::debug;

pub(super) struct HeadingHandler;

#[async_trait]
impl EmHandler for HeadingHandler {
    fn handles(&self) -> &'static [Command] {
        &[Command::HEADING]
    }

    async fn handle(&self, evse: &Evse, _datagram: &Datagram) {
        let response = Datagram::new(Command::HEADING_RESPONSE, vec![0x00]);
        let evse = evse.clone();
        tokio::spawn(async move {
            match evse.send_datagram(response).await {
                Ok(()) => {
                    evse.session.lock().unwrap().last_active_login = Some(Instant::now());
                }
                Err(err) => {
                    debug!(serial = %evse.serial(), %err,
                        "failed to send heading response; the login session may expire");
                }
            }
        });
    }
}
