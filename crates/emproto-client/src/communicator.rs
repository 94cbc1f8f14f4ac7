//! The communicator: public facade tying together transport, registry,
//! dispatcher, session ticker and event fan-out.

use crate::events::{EventBus, EventWatcher};
use crate::evse::Evse;
use crate::handlers::Dispatcher;
use crate::registry::Registry;
use async_trait::async_trait;
use emproto_codec::Datagram;
use emproto_transport::{DatagramSink, TransportConfig, UdpEndpoint};
use emproto_types::{EmResult, EventKind, Serial, UserId};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Period of the liveness/refresh ticker.
const TICK_PERIOD: Duration = Duration::from_secs(5);

/// Communicator configuration.
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// Application name; used as the default user id in charge commands.
    pub app_name: UserId,
    /// Log full frame dumps for every datagram sent and received.
    pub debug: bool,
    /// Transport settings; the default binds the protocol port on all
    /// IPv4 interfaces.
    pub transport: TransportConfig,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            app_name: "emproto".to_string(),
            debug: false,
            transport: TransportConfig::default(),
        }
    }
}

/// State shared between the communicator, its EVSE records and the receive
/// pipeline. Does not own the registry, so record handles can hold it
/// without creating reference cycles.
pub(crate) struct Shared {
    pub app_name: UserId,
    pub debug: bool,
    pub endpoint: UdpEndpoint,
    pub events: Arc<EventBus>,
}

/// Inbound pipeline: find-or-create the record, then let it process the
/// frame through the dispatcher.
struct InboundSink {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
}

#[async_trait]
impl DatagramSink for InboundSink {
    async fn datagram_received(&self, datagram: Datagram, addr: SocketAddr) {
        let evse = self.registry.define_or_get(&datagram.serial);
        evse.datagram_received(&self.dispatcher, &datagram, addr).await;
    }
}

/// A communicator discovers EVSEs on the local network, mirrors their
/// state, and issues commands to them.
///
/// All methods take `&self`; the communicator is cheap to share behind an
/// [`Arc`]. Methods that emit events must run inside a tokio runtime.
pub struct EmCommunicator {
    shared: Arc<Shared>,
    registry: Arc<Registry>,
    sink: Arc<InboundSink>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl EmCommunicator {
    /// Create a communicator with default transport settings.
    pub fn new(app_name: impl Into<UserId>, debug: bool) -> Self {
        Self::with_config(CommunicatorConfig {
            app_name: app_name.into(),
            debug,
            ..Default::default()
        })
    }

    pub fn with_config(config: CommunicatorConfig) -> Self {
        let shared = Arc::new(Shared {
            app_name: config.app_name,
            debug: config.debug,
            endpoint: UdpEndpoint::new(config.transport),
            events: Arc::new(EventBus::new()),
        });
        let registry = Arc::new(Registry::new(shared.clone()));
        let sink = Arc::new(InboundSink {
            registry: registry.clone(),
            dispatcher: Dispatcher::with_default_handlers(),
        });
        EmCommunicator {
            shared,
            registry,
            sink,
            ticker: Mutex::new(None),
        }
    }

    pub fn app_name(&self) -> &UserId {
        &self.shared.app_name
    }

    /// Bind the UDP socket and start discovering EVSEs.
    pub async fn start(&self) -> EmResult<()> {
        self.shared
            .endpoint
            .start(self.sink.clone() as Arc<dyn DatagramSink>)
            .await
            .map_err(emproto_types::EmError::from)?;

        let mut ticker = self.ticker.lock().unwrap();
        if ticker.is_none() {
            let registry = self.registry.clone();
            *ticker = Some(tokio::spawn(async move {
                let start = tokio::time::Instant::now() + TICK_PERIOD;
                let mut interval = tokio::time::interval_at(start, TICK_PERIOD);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    for evse in registry.list() {
                        evse.tick().await;
                    }
                }
            }));
        }
        info!("communicator started");
        Ok(())
    }

    /// Stop the communicator: close the socket, cancel all waiters, and
    /// mark every EVSE logged out and offline. Liveness timestamps are
    /// cleared so a quick restart produces fresh online events.
    pub async fn stop(&self) {
        if !self.shared.endpoint.is_started() {
            return;
        }
        if let Some(ticker) = self.ticker.lock().unwrap().take() {
            ticker.abort();
        }
        self.shared.endpoint.stop().await;

        for evse in self.registry.list() {
            self.shared.events.clear(evse.serial());
            let (was_logged_in, was_online) = evse.demote_for_stop();
            if was_logged_in {
                evse.queue_event(EventKind::EvseLoggedOut);
            }
            if was_online {
                evse.queue_event(EventKind::EvseOffline);
            }
        }
        info!("communicator stopped");
    }

    /// All currently known EVSEs.
    pub fn evses(&self) -> Vec<Evse> {
        self.registry.list()
    }

    /// The EVSE with this serial, if known.
    pub fn evse(&self, serial: &Serial) -> Option<Evse> {
        self.registry.get(serial)
    }

    /// Define an EVSE ahead of discovery, typically to seat a password on
    /// it. Returns the existing record when the serial is already known.
    pub fn define_evse(&self, serial: &Serial) -> Evse {
        self.registry.define_or_get(serial)
    }

    /// Remove an EVSE. Fails while the EVSE is online.
    pub fn remove_evse(&self, evse: &Evse) -> EmResult<()> {
        self.registry.remove(evse)
    }

    /// Subscribe to events, optionally filtered by EVSE and by kind. An
    /// empty kind list receives all kinds. `capacity` sizes the delivery
    /// channel (at least 1); a watcher that stops draining is removed.
    pub fn watch(
        &self,
        evse: Option<&Evse>,
        kinds: &[EventKind],
        capacity: usize,
    ) -> EventWatcher {
        self.shared
            .events
            .watch(evse.map(|e| e.serial().clone()), kinds, capacity)
    }

    /// Local address of the bound socket, once started.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.endpoint.local_addr().await
    }
}
