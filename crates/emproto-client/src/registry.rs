//! Registry of known EVSEs, keyed by serial.

use crate::communicator::Shared;
use crate::evse::Evse;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use emproto_types::{EmError, EmResult, EventKind, Serial};
use std::sync::Arc;
use tracing::info;

/// Concurrent map from serial to EVSE record. Reads vastly dominate;
/// inserts happen on first discovery and removals only for offline
/// records.
pub(crate) struct Registry {
    evses: DashMap<Serial, Evse>,
    shared: Arc<Shared>,
}

impl Registry {
    pub fn new(shared: Arc<Shared>) -> Self {
        Registry {
            evses: DashMap::new(),
            shared,
        }
    }

    pub fn get(&self, serial: &Serial) -> Option<Evse> {
        self.evses.get(serial).map(|entry| entry.value().clone())
    }

    /// Snapshot of all known EVSEs.
    pub fn list(&self) -> Vec<Evse> {
        self.evses
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Return the record for `serial`, creating it on first sight. The
    /// added event is emitted exactly once per record.
    pub fn define_or_get(&self, serial: &Serial) -> Evse {
        match self.evses.entry(serial.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                info!(%serial, "new EVSE");
                let evse = Evse::new(serial.clone(), self.shared.clone());
                entry.insert(evse.clone());
                evse.queue_event(EventKind::EvseAdded);
                evse
            }
        }
    }

    /// Remove a record. An online EVSE cannot be removed, as it would be
    /// rediscovered within seconds; queued events for the serial are
    /// dropped and one removed event is emitted.
    pub fn remove(&self, evse: &Evse) -> EmResult<()> {
        if evse.is_online() {
            return Err(EmError::Online {
                serial: evse.serial().clone(),
            });
        }
        self.shared.events.clear(evse.serial());
        evse.queue_event(EventKind::EvseRemoved);
        self.evses.remove(evse.serial());
        Ok(())
    }
}
