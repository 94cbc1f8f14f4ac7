//! The per-EVSE record: state mirror sections, session liveness, the
//! request/response waiter table, and inbound frame processing.

mod charging;
mod config;
mod login;

use crate::communicator::Shared;
use crate::events::{Event, EventWatcher};
use crate::handlers::Dispatcher;
use chrono::Utc;
use emproto_codec::{Command, Datagram};
use emproto_types::{
    EmError, EmResult, EventKind, EvseCharge, EvseConfig, EvseInfo, EvseState, MetaState,
    OutputState, Password, Serial,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace};

/// An EVSE is online while frames keep arriving within this window.
pub const ONLINE_WINDOW: Duration = Duration::from_secs(11);

/// A login session stays valid this long after the last confirmed
/// keep-alive or login.
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15);

/// Default timeout for a correlated response.
pub(crate) const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between auto-login attempts.
pub(crate) const AUTO_LOGIN_RETRY: Duration = Duration::from_secs(5);

/// Connection-level state of one EVSE.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub addr: Option<SocketAddr>,
    pub last_seen: Option<Instant>,
    pub last_active_login: Option<Instant>,
    pub password: Password,
    pub info_fetched: Option<Instant>,
    pub charge_fetched: Option<Instant>,
    pub config_fetched: Option<Instant>,
}

impl Session {
    pub fn is_online(&self) -> bool {
        self.last_seen
            .map(|t| t.elapsed() < ONLINE_WINDOW)
            .unwrap_or(false)
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_online()
            && self
                .last_active_login
                .map(|t| t.elapsed() < LOGIN_WINDOW)
                .unwrap_or(false)
    }
}

#[derive(Default)]
struct WaiterTable {
    next_id: u64,
    by_command: HashMap<Command, Vec<(u64, mpsc::Sender<Datagram>)>>,
}

/// Handle to one EVSE record.
///
/// The record itself lives in the communicator's registry; handles are
/// cheap clones sharing the same state. All getters return snapshots, so a
/// handle can be held across await points freely.
#[derive(Clone)]
pub struct Evse {
    serial: Serial,
    pub(crate) shared: Arc<Shared>,
    pub(crate) info: Arc<RwLock<EvseInfo>>,
    pub(crate) state: Arc<RwLock<EvseState>>,
    pub(crate) charge: Arc<RwLock<EvseCharge>>,
    pub(crate) config: Arc<RwLock<EvseConfig>>,
    pub(crate) session: Arc<Mutex<Session>>,
    waiters: Arc<Mutex<WaiterTable>>,
}

impl Evse {
    pub(crate) fn new(serial: Serial, shared: Arc<Shared>) -> Self {
        Evse {
            info: Arc::new(RwLock::new(EvseInfo::new(serial.clone()))),
            state: Arc::new(RwLock::new(EvseState::default())),
            charge: Arc::new(RwLock::new(EvseCharge::default())),
            config: Arc::new(RwLock::new(EvseConfig::default())),
            session: Arc::new(Mutex::new(Session::default())),
            waiters: Arc::new(Mutex::new(WaiterTable::default())),
            serial,
            shared,
        }
    }

    pub fn serial(&self) -> &Serial {
        &self.serial
    }

    /// Snapshot of the static device information.
    pub async fn info(&self) -> EvseInfo {
        self.info.read().await.clone()
    }

    /// Snapshot of the live electrical state.
    pub async fn state(&self) -> EvseState {
        self.state.read().await.clone()
    }

    /// Snapshot of the charge-session data.
    pub async fn charge(&self) -> EvseCharge {
        self.charge.read().await.clone()
    }

    /// Snapshot of the device configuration.
    pub async fn config(&self) -> EvseConfig {
        self.config.read().await.clone()
    }

    /// Address the EVSE last sent a frame from; unicast replies go there.
    pub fn address(&self) -> Option<SocketAddr> {
        self.session.lock().unwrap().addr
    }

    pub fn is_online(&self) -> bool {
        self.session.lock().unwrap().is_online()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.lock().unwrap().is_logged_in()
    }

    /// Derived high-level status.
    pub async fn meta_state(&self) -> MetaState {
        if !self.is_online() {
            return MetaState::Offline;
        }
        if !self.is_logged_in() {
            return MetaState::NotLoggedIn;
        }
        let state = self.state.read().await;
        if !state.errors.is_empty() {
            MetaState::Error
        } else if state.output_state == OutputState::Charging {
            MetaState::Charging
        } else if state.gun_state.is_connected() {
            MetaState::PluggedIn
        } else {
            MetaState::Idle
        }
    }

    /// Human-friendly label: configured name, else brand and model, else
    /// the serial. May change as information becomes available.
    pub async fn label(&self) -> String {
        {
            let config = self.config.read().await;
            if !config.name.is_empty() {
                return config.name.clone();
            }
        }
        {
            let info = self.info.read().await;
            if !info.brand.is_empty() && !info.model.is_empty() {
                return format!("{} {}", info.brand, info.model);
            }
        }
        self.serial.to_string()
    }

    /// Watch events for this EVSE only.
    pub fn watch(&self, kinds: &[EventKind], capacity: usize) -> EventWatcher {
        self.shared
            .events
            .watch(Some(self.serial.clone()), kinds, capacity)
    }

    pub(crate) fn queue_event(&self, kind: EventKind) {
        self.shared.events.queue(Event {
            kind,
            evse: self.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Send one datagram to this EVSE, filling in serial and stored
    /// password. Requires the EVSE to be online, and logged in for
    /// everything except the login handshake and protocol acks.
    pub(crate) async fn send_datagram(&self, mut datagram: Datagram) -> EmResult<()> {
        if !self.is_online() {
            return Err(EmError::Offline {
                serial: self.serial.clone(),
            });
        }
        let exempt = matches!(
            datagram.command,
            Command::REQUEST_LOGIN
                | Command::LOGIN_CONFIRM
                | Command::SINGLE_AC_STATUS_ACK
                | Command::SINGLE_AC_CHARGING_ACK
        );
        if !exempt && !self.is_logged_in() {
            return Err(EmError::NotLoggedIn {
                serial: self.serial.clone(),
            });
        }

        datagram.serial = self.serial.clone();
        let addr = {
            let session = self.session.lock().unwrap();
            if !datagram.password.is_set() && session.password.is_set() {
                datagram.password = session.password.clone();
            }
            session.addr
        };
        let addr = addr.ok_or_else(|| EmError::Offline {
            serial: self.serial.clone(),
        })?;

        let data = datagram.encode()?;
        if self.shared.debug {
            debug!(%addr, "-> SEND {datagram}");
        }
        self.shared.endpoint.send_to(&data, addr).await?;
        Ok(())
    }

    /// Wait for the first inbound datagram carrying one of `commands`.
    ///
    /// Returns [`EmError::Timeout`] when nothing matches in time and
    /// [`EmError::Stopped`] when the communicator stops while waiting.
    pub(crate) async fn wait_for(
        &self,
        timeout: Duration,
        commands: &[Command],
    ) -> EmResult<Datagram> {
        let (tx, mut rx) = mpsc::channel(1);
        let id = {
            let mut table = self.waiters.lock().unwrap();
            table.next_id += 1;
            let id = table.next_id;
            for command in commands {
                table
                    .by_command
                    .entry(*command)
                    .or_default()
                    .push((id, tx.clone()));
            }
            id
        };
        drop(tx);

        let mut started = self.shared.endpoint.started_watch();
        tokio::select! {
            received = rx.recv() => match received {
                Some(datagram) => Ok(datagram),
                None => {
                    self.remove_waiter(id, commands);
                    Err(EmError::Stopped)
                }
            },
            _ = tokio::time::sleep(timeout) => {
                self.remove_waiter(id, commands);
                Err(EmError::Timeout)
            }
            _ = started.wait_for(|started| !*started) => {
                self.remove_waiter(id, commands);
                Err(EmError::Stopped)
            }
        }
    }

    fn remove_waiter(&self, id: u64, commands: &[Command]) {
        let mut table = self.waiters.lock().unwrap();
        for command in commands {
            if let Some(waiters) = table.by_command.get_mut(command) {
                waiters.retain(|(waiter_id, _)| *waiter_id != id);
                if waiters.is_empty() {
                    table.by_command.remove(command);
                }
            }
        }
    }

    /// Hand a matching datagram to every waiter registered for its command
    /// and drop those registrations. Delivery never blocks.
    fn deliver_waiters(&self, datagram: &Datagram) {
        let waiters = {
            let mut table = self.waiters.lock().unwrap();
            table.by_command.remove(&datagram.command)
        };
        if let Some(waiters) = waiters {
            for (_, tx) in waiters {
                let _ = tx.try_send(datagram.clone());
            }
        }
    }

    /// Process one decoded inbound datagram addressed to this EVSE.
    pub(crate) async fn datagram_received(
        &self,
        dispatcher: &Dispatcher,
        datagram: &Datagram,
        addr: SocketAddr,
    ) {
        if datagram.serial != self.serial {
            return;
        }
        if self.shared.debug {
            debug!(%addr, "<- RECV {datagram}");
        } else {
            trace!(%addr, command = %datagram.command, "received datagram");
        }

        let (was_online, has_password, addr_changed) = {
            let mut session = self.session.lock().unwrap();
            let was_online = session.is_online();
            session.last_seen = Some(Instant::now());
            let addr_changed = session.addr != Some(addr);
            session.addr = Some(addr);
            (was_online, session.password.is_set(), addr_changed)
        };

        if !was_online {
            self.queue_event(EventKind::EvseOnline);
        }
        if addr_changed {
            self.queue_event(EventKind::EvseInfoUpdated);
        }
        if !was_online && has_password {
            let evse = self.clone();
            tokio::spawn(async move { evse.auto_login().await });
        }

        let handled = dispatcher.dispatch(self, datagram).await;
        if handled == 0 {
            debug!(serial = %self.serial, command = %datagram.command, "no handler for command");
        }

        self.deliver_waiters(datagram);
    }

    /// Periodic liveness processing: demote expired sessions and refresh
    /// the mirror of a logged-in EVSE.
    pub(crate) async fn tick(&self) {
        let (logged_out, went_offline, logged_in) = {
            let mut session = self.session.lock().unwrap();
            let mut logged_out = false;
            let mut went_offline = false;
            if !session.is_logged_in() && session.last_active_login.is_some() {
                session.last_active_login = None;
                logged_out = true;
            }
            if !session.is_online() && session.last_seen.is_some() {
                session.last_seen = None;
                went_offline = true;
            }
            (logged_out, went_offline, session.is_logged_in())
        };

        if logged_out {
            self.queue_event(EventKind::EvseLoggedOut);
        }
        if went_offline {
            self.queue_event(EventKind::EvseOffline);
        }

        if logged_in {
            self.spawn_fetch("charge", |evse| async move {
                evse.fetch_charge(Duration::from_secs(30)).await
            });
            self.spawn_fetch("info", |evse| async move {
                evse.fetch_info(Duration::from_secs(4 * 60)).await
            });
            self.spawn_fetch("config", |evse| async move {
                evse.fetch_config(Duration::from_secs(3 * 60)).await
            });
        }
    }

    fn spawn_fetch<F, Fut>(&self, what: &'static str, fetch: F)
    where
        F: FnOnce(Evse) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = EmResult<()>> + Send,
    {
        let evse = self.clone();
        tokio::spawn(async move {
            let serial = evse.serial().clone();
            if let Err(err) = fetch(evse).await {
                debug!(%serial, %err, "failed to refresh {what} data");
            }
        });
    }

    /// Demote the session on communicator stop; returns which transition
    /// events should be queued.
    pub(crate) fn demote_for_stop(&self) -> (bool, bool) {
        let mut session = self.session.lock().unwrap();
        let was_logged_in = session.is_logged_in();
        let was_online = session.is_online();
        if was_logged_in {
            session.last_active_login = None;
        }
        if was_online {
            session.last_seen = None;
        }
        (was_logged_in, was_online)
    }
}

impl std::fmt::Debug for Evse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evse")
            .field("serial", &self.serial)
            .field("addr", &self.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communicator::{CommunicatorConfig, EmCommunicator};
    use emproto_transport::TransportConfig;
    use emproto_types::GunState;
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

    fn mark_seen(evse: &Evse) {
        evse.session.lock().unwrap().last_seen = Some(Instant::now());
    }

    fn mark_logged_in(evse: &Evse) {
        let mut session = evse.session.lock().unwrap();
        session.last_seen = Some(Instant::now());
        session.last_active_login = Some(Instant::now());
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn online_window_is_eleven_seconds() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        assert!(!evse.is_online());

        mark_seen(&evse);
        assert!(evse.is_online());

        advance(Duration::from_millis(10_900)).await;
        assert!(evse.is_online());

        advance(Duration::from_millis(200)).await;
        assert!(!evse.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn login_window_is_fifteen_seconds() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        mark_logged_in(&evse);
        assert!(evse.is_logged_in());

        // Keep the EVSE online; only the login window should lapse.
        for _ in 0..14 {
            advance(Duration::from_secs(1)).await;
            mark_seen(&evse);
            assert!(evse.is_logged_in());
        }
        advance(Duration::from_millis(1_100)).await;
        mark_seen(&evse);
        assert!(evse.is_online());
        assert!(!evse.is_logged_in());
    }

    #[tokio::test(start_paused = true)]
    async fn logged_in_requires_online() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        mark_logged_in(&evse);

        advance(Duration::from_millis(11_500)).await;
        // The login window has not lapsed, but the EVSE is gone.
        assert!(!evse.is_online());
        assert!(!evse.is_logged_in());
    }

    #[tokio::test(start_paused = true)]
    async fn meta_state_precedence() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        assert_eq!(evse.meta_state().await, MetaState::Offline);

        mark_seen(&evse);
        assert_eq!(evse.meta_state().await, MetaState::NotLoggedIn);

        mark_logged_in(&evse);
        assert_eq!(evse.meta_state().await, MetaState::Idle);

        evse.state.write().await.gun_state = GunState::ConnectedLocked;
        assert_eq!(evse.meta_state().await, MetaState::PluggedIn);

        evse.state.write().await.output_state = OutputState::Charging;
        assert_eq!(evse.meta_state().await, MetaState::Charging);

        evse.state
            .write()
            .await
            .errors
            .insert(emproto_types::EvseError::EmergencyStop);
        assert_eq!(evse.meta_state().await, MetaState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_demotes_expired_sessions() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        let mut watcher = communicator.watch(
            None,
            &[EventKind::EvseOffline, EventKind::EvseLoggedOut],
            8,
        );
        mark_logged_in(&evse);

        // Within both windows nothing happens.
        advance(Duration::from_secs(5)).await;
        evse.tick().await;
        advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(watcher.try_recv().is_none());

        advance(Duration::from_millis(6_500)).await;
        evse.tick().await;
        advance(Duration::from_millis(500)).await;
        settle().await;

        let mut kinds = vec![
            watcher.try_recv().expect("two transitions expected").kind,
            watcher.try_recv().expect("two transitions expected").kind,
        ];
        kinds.sort();
        assert_eq!(
            kinds,
            vec![EventKind::EvseOffline, EventKind::EvseLoggedOut]
        );

        // Timestamps were cleared; another tick stays quiet.
        evse.tick().await;
        advance(Duration::from_millis(500)).await;
        settle().await;
        assert!(watcher.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn label_prefers_name_then_brand_model() {
        let communicator = test_communicator();
        let evse = communicator.define_evse(&serial());
        assert_eq!(evse.label().await, serial().to_string());

        {
            let mut info = evse.info.write().await;
            info.brand = "Foo".to_string();
            info.model = "Bar".to_string();
        }
        assert_eq!(evse.label().await, "Foo Bar");

        evse.config.write().await.name = "garage".to_string();
        assert_eq!(evse.label().await, "garage");
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_receives_matching_datagram() {
        let communicator = test_communicator();
        communicator.start().await.unwrap();
        let evse = communicator.define_evse(&serial());

        let waiting = {
            let evse = evse.clone();
            tokio::spawn(async move {
                evse.wait_for(
                    RESPONSE_TIMEOUT,
                    &[Command::LOGIN_RESPONSE, Command::PASSWORD_ERROR],
                )
                .await
            })
        };
        settle().await;

        let mut datagram = Datagram::new(Command::PASSWORD_ERROR, vec![]);
        datagram.serial = serial();
        evse.deliver_waiters(&datagram);

        let received = waiting.await.unwrap().unwrap();
        assert_eq!(received.command, Command::PASSWORD_ERROR);
        communicator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out() {
        let communicator = test_communicator();
        communicator.start().await.unwrap();
        let evse = communicator.define_evse(&serial());

        let waiting = {
            let evse = evse.clone();
            tokio::spawn(async move {
                evse.wait_for(Duration::from_secs(1), &[Command::LOGIN_RESPONSE])
                    .await
            })
        };
        settle().await;
        advance(Duration::from_millis(1_100)).await;

        assert_eq!(waiting.await.unwrap(), Err(EmError::Timeout));

        // The table entry was cleaned up: delivery finds nobody.
        let mut datagram = Datagram::new(Command::LOGIN_RESPONSE, vec![]);
        datagram.serial = serial();
        evse.deliver_waiters(&datagram);
        communicator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_cancelled_on_stop() {
        let communicator = test_communicator();
        communicator.start().await.unwrap();
        let evse = communicator.define_evse(&serial());

        let waiting = {
            let evse = evse.clone();
            tokio::spawn(async move {
                evse.wait_for(RESPONSE_TIMEOUT, &[Command::LOGIN_RESPONSE])
                    .await
            })
        };
        settle().await;

        communicator.stop().await;
        assert_eq!(waiting.await.unwrap(), Err(EmError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn send_requires_online_and_login() {
        let communicator = test_communicator();
        communicator.start().await.unwrap();
        let evse = communicator.define_evse(&serial());

        let err = evse
            .send_datagram(Datagram::new(Command::GET_VERSION, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EmError::Offline { .. }));

        {
            let mut session = evse.session.lock().unwrap();
            session.last_seen = Some(Instant::now());
            session.addr = Some("127.0.0.1:28376".parse().unwrap());
        }
        let err = evse
            .send_datagram(Datagram::new(Command::GET_VERSION, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EmError::NotLoggedIn { .. }));

        // The login handshake itself is exempt.
        evse.send_datagram(Datagram::new(Command::REQUEST_LOGIN, vec![0x00]).with_password(
            Password::new("123456"),
        ))
        .await
        .unwrap();
        communicator.stop().await;
    }
}
