//! Event debouncing and watcher fan-out.
//!
//! Events are coalesced per (serial, kind) key: a burst of identical events
//! within the debounce window yields one delivery carrying the latest
//! instance. A key that keeps getting requeued is force-dispatched once its
//! first occurrence is old enough, so a steady storm still delivers at
//! least once every two seconds.

use crate::evse::Evse;
use chrono::{DateTime, Utc};
use emproto_types::{EventKind, Serial};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Window within which identical events are coalesced.
const DEBOUNCE: std::time::Duration = std::time::Duration::from_millis(400);

/// A key that has been pending this long is dispatched immediately on the
/// next queue instead of having its timer reset again.
const FORCE_DISPATCH_AFTER: std::time::Duration = std::time::Duration::from_millis(2000);

/// An EVSE event as delivered to watchers.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Handle of the EVSE the event belongs to.
    pub evse: Evse,
    pub timestamp: DateTime<Utc>,
}

type Key = (Serial, EventKind);

struct Pending {
    event: Event,
    first_queued: Instant,
    timer: JoinHandle<()>,
}

struct WatcherEntry {
    id: u64,
    serial: Option<Serial>,
    kinds: Vec<EventKind>,
    tx: mpsc::Sender<Event>,
}

impl WatcherEntry {
    fn matches(&self, event: &Event) -> bool {
        if let Some(serial) = &self.serial {
            if serial != event.evse.serial() {
                return false;
            }
        }
        self.kinds.is_empty() || self.kinds.contains(&event.kind)
    }
}

/// Debounces queued events and fans them out to watchers.
///
/// Both tables use short-held locks and are never locked at the same time;
/// delivery to watcher channels is non-blocking.
pub(crate) struct EventBus {
    pending: Mutex<HashMap<Key, Pending>>,
    watchers: Mutex<Vec<WatcherEntry>>,
    next_watcher_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            pending: Mutex::new(HashMap::new()),
            watchers: Mutex::new(Vec::new()),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    /// Queue an event for debounced delivery. Must be called from within a
    /// tokio runtime.
    pub fn queue(self: &Arc<Self>, event: Event) {
        let key = (event.evse.serial().clone(), event.kind);
        let kind = event.kind;
        let evse = event.evse.clone();

        let force_dispatch = {
            let mut pending = self.pending.lock().unwrap();
            let force = match pending.get_mut(&key) {
                Some(entry) => {
                    entry.event = event;
                    entry.timer.abort();
                    if entry.first_queued.elapsed() >= FORCE_DISPATCH_AFTER {
                        true
                    } else {
                        entry.timer = self.spawn_timer(key.clone());
                        false
                    }
                }
                None => {
                    pending.insert(
                        key.clone(),
                        Pending {
                            event,
                            first_queued: Instant::now(),
                            timer: self.spawn_timer(key.clone()),
                        },
                    );
                    false
                }
            };
            if force {
                pending.remove(&key)
            } else {
                None
            }
        };
        if let Some(entry) = force_dispatch {
            self.dispatch(entry.event);
        }

        // Online/offline and login transitions are visible through the info
        // view, charge transitions through the state view; queue the
        // matching update so mirror-keeping watchers see them.
        let secondary = match kind {
            EventKind::EvseOnline
            | EventKind::EvseOffline
            | EventKind::EvseLoggedIn
            | EventKind::EvseLoggedOut => Some(EventKind::EvseInfoUpdated),
            EventKind::EvseChargeStarted | EventKind::EvseChargeStopped => {
                Some(EventKind::EvseStateUpdated)
            }
            _ => None,
        };
        if let Some(kind) = secondary {
            self.queue(Event {
                kind,
                evse,
                timestamp: Utc::now(),
            });
        }
    }

    fn spawn_timer(self: &Arc<Self>, key: Key) -> JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            bus.dispatch_pending(&key);
        })
    }

    fn dispatch_pending(&self, key: &Key) {
        let entry = self.pending.lock().unwrap().remove(key);
        if let Some(entry) = entry {
            entry.timer.abort();
            self.dispatch(entry.event);
        }
    }

    fn dispatch(&self, event: Event) {
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|watcher| {
            if !watcher.matches(&event) {
                return true;
            }
            match watcher.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(_) => {
                    debug!(id = watcher.id, "watcher channel full or closed, removing watcher");
                    false
                }
            }
        });
    }

    /// Drop all queued events for a serial (used on removal and stop).
    pub fn clear(&self, serial: &Serial) {
        let mut pending = self.pending.lock().unwrap();
        pending.retain(|key, entry| {
            if key.0 == *serial {
                entry.timer.abort();
                false
            } else {
                true
            }
        });
    }

    /// Register a watcher; delivery is via a bounded channel of at least
    /// capacity 1, and a watcher whose channel is full or closed at
    /// delivery time is stopped and removed.
    pub fn watch(
        self: &Arc<Self>,
        serial: Option<Serial>,
        kinds: &[EventKind],
        capacity: usize,
    ) -> EventWatcher {
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.watchers.lock().unwrap().push(WatcherEntry {
            id,
            serial: serial.clone(),
            kinds: kinds.to_vec(),
            tx,
        });
        EventWatcher {
            id,
            serial,
            kinds: kinds.to_vec(),
            bus: self.clone(),
            rx,
        }
    }

    fn remove_watcher(&self, id: u64) {
        self.watchers.lock().unwrap().retain(|w| w.id != id);
    }

    fn has_watcher(&self, id: u64) -> bool {
        self.watchers.lock().unwrap().iter().any(|w| w.id == id)
    }
}

/// A registered event subscription.
///
/// Each watcher is its own identity: two watchers with identical filters
/// are distinct and stop independently. Dropping the watcher or calling
/// [`EventWatcher::stop`] removes it from fan-out and closes the channel.
pub struct EventWatcher {
    id: u64,
    serial: Option<Serial>,
    kinds: Vec<EventKind>,
    bus: Arc<EventBus>,
    rx: mpsc::Receiver<Event>,
}

impl EventWatcher {
    /// Receive the next event; `None` once the watcher has been stopped and
    /// the channel drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving events. Queued events may still be drained with
    /// [`EventWatcher::recv`].
    pub fn stop(&self) {
        self.bus.remove_watcher(self.id);
    }

    /// Whether this watcher has been removed from fan-out, either by
    /// [`EventWatcher::stop`] or because delivery failed.
    pub fn is_stopped(&self) -> bool {
        !self.bus.has_watcher(self.id)
    }

    pub fn serial_filter(&self) -> Option<&Serial> {
        self.serial.as_ref()
    }

    pub fn kinds(&self) -> &[EventKind] {
        &self.kinds
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        self.bus.remove_watcher(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::{CommunicatorConfig, EmCommunicator};
    use emproto_transport::TransportConfig;
    use std::time::Duration;
    use tokio::time::advance;

    fn test_communicator() -> EmCommunicator {
        EmCommunicator::with_config(CommunicatorConfig {
            transport: TransportConfig {
                bind_address: "127.0.0.1".parse().unwrap(),
                port: 0,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn serial() -> Serial {
        Serial::new("aabbccddeeff0011")
    }

    async fn settle() {
        // Let spawned debounce timers and dispatches run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_identical_events_is_coalesced() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(None, &[EventKind::EvseStateUpdated], 8);

        for _ in 0..5 {
            evse.queue_event(EventKind::EvseStateUpdated);
            advance(Duration::from_millis(50)).await;
        }
        advance(Duration::from_millis(500)).await;
        settle().await;

        let event = watcher.try_recv().expect("one delivery expected");
        assert_eq!(event.kind, EventKind::EvseStateUpdated);
        assert_eq!(event.evse.serial(), &serial());
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn steady_storm_still_delivers_every_two_seconds() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(None, &[EventKind::EvseChargeUpdated], 16);

        // Requeue every 300 ms: each queue lands inside the debounce
        // window, so only the 2 s override can get anything out.
        for _ in 0..=10 {
            evse.queue_event(EventKind::EvseChargeUpdated);
            advance(Duration::from_millis(300)).await;
        }
        advance(Duration::from_millis(500)).await;
        settle().await;

        let mut deliveries = 0;
        while watcher.try_recv().is_some() {
            deliveries += 1;
        }
        // One forced dispatch once the key is 2 s old, one trailing
        // delivery when the storm ends.
        assert_eq!(deliveries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn online_event_implies_info_updated() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(
            None,
            &[EventKind::EvseOnline, EventKind::EvseInfoUpdated],
            8,
        );

        evse.queue_event(EventKind::EvseOnline);
        advance(Duration::from_millis(500)).await;
        settle().await;

        let mut kinds = vec![
            watcher.try_recv().expect("two deliveries expected").kind,
            watcher.try_recv().expect("two deliveries expected").kind,
        ];
        kinds.sort();
        assert_eq!(kinds, vec![EventKind::EvseOnline, EventKind::EvseInfoUpdated]);
    }

    #[tokio::test(start_paused = true)]
    async fn charge_started_implies_state_updated() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(None, &[], 8);

        evse.queue_event(EventKind::EvseChargeStarted);
        advance(Duration::from_millis(500)).await;
        settle().await;

        let mut kinds = Vec::new();
        while let Some(event) = watcher.try_recv() {
            kinds.push(event.kind);
        }
        assert!(kinds.contains(&EventKind::EvseChargeStarted));
        assert!(kinds.contains(&EventKind::EvseStateUpdated));
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_filters_by_serial_and_kind() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let other = communicator.define_evse(&Serial::new("1111111111111111"));

        let mut watcher = communicator.watch(Some(&evse), &[EventKind::EvseConfigUpdated], 8);

        other.queue_event(EventKind::EvseConfigUpdated);
        evse.queue_event(EventKind::EvseStateUpdated);
        evse.queue_event(EventKind::EvseConfigUpdated);
        advance(Duration::from_millis(500)).await;
        settle().await;

        let event = watcher.try_recv().expect("one delivery expected");
        assert_eq!(event.evse.serial(), &serial());
        assert_eq!(event.kind, EventKind::EvseConfigUpdated);
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn watcher_with_full_channel_is_removed() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let watcher = communicator.watch(
            None,
            &[EventKind::EvseStateUpdated, EventKind::EvseConfigUpdated],
            1,
        );

        evse.queue_event(EventKind::EvseStateUpdated);
        advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(!watcher.is_stopped());

        // Nothing drained the single-slot channel, so the next delivery
        // fails and stops the watcher.
        evse.queue_event(EventKind::EvseConfigUpdated);
        advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(watcher.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_watcher_receives_nothing_more() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(None, &[EventKind::EvseStateUpdated], 8);
        // Two watchers with identical filters are distinct.
        let mut second = communicator.watch(None, &[EventKind::EvseStateUpdated], 8);

        watcher.stop();
        assert!(watcher.is_stopped());
        assert!(!second.is_stopped());

        evse.queue_event(EventKind::EvseStateUpdated);
        advance(Duration::from_millis(500)).await;
        settle().await;

        assert!(watcher.try_recv().is_none());
        assert!(second.try_recv().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_queued_events() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(None, &[EventKind::EvseStateUpdated], 8);

        evse.queue_event(EventKind::EvseStateUpdated);
        evse.shared.events.clear(&serial());
        advance(Duration::from_millis(500)).await;
        settle().await;

        assert!(watcher.try_recv().is_none());
    }
}
