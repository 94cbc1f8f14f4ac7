//! Inbound command handlers and their dispatcher.
//!
//! The handler set is closed and registered when the communicator is
//! created. The dispatcher walks all handlers for every decoded inbound
//! datagram; more than one handler may claim the same command.

mod charge_ack;
mod charging;
mod config;
mod heading;
mod login_info;
mod status;
mod version;

use crate::evse::Evse;
use async_trait::async_trait;
use emproto_codec::{Command, Datagram};
use tracing::warn;

/// Handler for one family of inbound commands.
#[async_trait]
pub(crate) trait EmHandler: Send + Sync {
    /// Commands this handler wants to see.
    fn handles(&self) -> &'static [Command];

    /// Apply one datagram to the EVSE record. Never called for commands
    /// outside [`EmHandler::handles`].
    async fn handle(&self, evse: &Evse, datagram: &Datagram);
}

/// The registered handler set, owned by the communicator.
pub(crate) struct Dispatcher {
    handlers: Vec<Box<dyn EmHandler>>,
}

impl Dispatcher {
    pub fn with_default_handlers() -> Self {
        Dispatcher {
            handlers: vec![
                Box::new(status::StatusHandler),
                Box::new(charging::ChargingHandler),
                Box::new(login_info::LoginInfoHandler),
                Box::new(version::VersionHandler),
                Box::new(config::ConfigHandler),
                Box::new(heading::HeadingHandler),
                Box::new(charge_ack::ChargeAckHandler),
            ],
        }
    }

    /// Invoke every handler claiming the datagram's command; returns how
    /// many did.
    pub async fn dispatch(&self, evse: &Evse, datagram: &Datagram) -> usize {
        let mut handled = 0;
        for handler in &self.handlers {
            if handler.handles().contains(&datagram.command) {
                handler.handle(evse, datagram).await;
                handled += 1;
            }
        }
        handled
    }
}

/// Minimum payload-length guard shared by all handlers: a short payload is
/// logged and dropped without touching any state.
pub(crate) fn payload_too_short(evse: &Evse, datagram: &Datagram, min_len: usize) -> bool {
    if datagram.payload.len() < min_len {
        warn!(
            serial = %evse.serial(),
            command = %datagram.command,
            need = min_len,
            got = datagram.payload.len(),
            "payload too short, dropping datagram"
        );
        true
    } else {
        false
    }
}

/// Assign `value` to `slot` only when it differs, tracking whether anything
/// changed so the handler queues at most one update event.
pub(crate) fn set_if_changed<T: PartialEq>(slot: &mut T, value: T, changed: &mut bool) {
    if *slot != value {
        *slot = value;
        *changed = true;
    }
}
