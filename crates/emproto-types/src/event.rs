//! Event kinds emitted by the communicator for EVSE lifecycle and state
//! changes.

use serde::{Deserialize, Serialize};

/// Kind of an EVSE event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    EvseAdded,
    EvseRemoved,
    EvseOnline,
    EvseOffline,
    EvseLoggedIn,
    EvseLoggedOut,
    EvseInfoUpdated,
    EvseStateUpdated,
    EvseChargeUpdated,
    EvseConfigUpdated,
    EvseChargeStarted,
    EvseChargeStopped,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EvseAdded => "EVSE_ADDED",
            EventKind::EvseRemoved => "EVSE_REMOVED",
            EventKind::EvseOnline => "EVSE_ONLINE",
            EventKind::EvseOffline => "EVSE_OFFLINE",
            EventKind::EvseLoggedIn => "EVSE_LOGGED_IN",
            EventKind::EvseLoggedOut => "EVSE_LOGGED_OUT",
            EventKind::EvseInfoUpdated => "EVSE_INFO_UPDATED",
            EventKind::EvseStateUpdated => "EVSE_STATE_UPDATED",
            EventKind::EvseChargeUpdated => "EVSE_CHARGE_UPDATED",
            EventKind::EvseConfigUpdated => "EVSE_CONFIG_UPDATED",
            EventKind::EvseChargeStarted => "EVSE_CHARGE_STARTED",
            EventKind::EvseChargeStopped => "EVSE_CHARGE_STOPPED",
        }
    }

    /// The event kinds that represent any change to an EVSE mirror: the
    /// added/removed pair plus the section updates. Online/offline,
    /// logged-in/out and charge started/stopped each also produce one of
    /// these, so watching this set alone keeps a mirror up to date.
    pub fn changed() -> &'static [EventKind] {
        &[
            EventKind::EvseAdded,
            EventKind::EvseRemoved,
            EventKind::EvseInfoUpdated,
            EventKind::EvseStateUpdated,
            EventKind::EvseChargeUpdated,
            EventKind::EvseConfigUpdated,
        ]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(EventKind::EvseAdded.to_string(), "EVSE_ADDED");
        assert_eq!(EventKind::EvseChargeStarted.to_string(), "EVSE_CHARGE_STARTED");
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&EventKind::EvseLoggedIn).unwrap();
        assert_eq!(json, "\"EVSE_LOGGED_IN\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::EvseLoggedIn);
    }

    #[test]
    fn changed_set_excludes_transition_kinds() {
        let changed = EventKind::changed();
        assert!(changed.contains(&EventKind::EvseInfoUpdated));
        assert!(!changed.contains(&EventKind::EvseOnline));
        assert!(!changed.contains(&EventKind::EvseChargeStarted));
    }
}
