//! The UDP endpoint: socket lifecycle, receive loop and serialized sends.

use crate::error::{TransportError, TransportResult};
use crate::{DatagramSink, TransportConfig};
use emproto_codec::Datagram;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

struct Inner {
    config: TransportConfig,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    /// Serializes sends so interleaved frames never corrupt each other.
    send_lock: Mutex<()>,
    started: watch::Sender<bool>,
}

/// A UDP endpoint bound to the protocol port.
///
/// `start` binds the socket and spawns the receive loop; `stop` closes the
/// socket and unblocks everything waiting on the endpoint. If the socket
/// fails while the endpoint has not been asked to stop, the receive loop
/// rebinds on the configured interval without surfacing the outage.
pub struct UdpEndpoint {
    inner: Arc<Inner>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpEndpoint {
    pub fn new(config: TransportConfig) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                socket: RwLock::new(None),
                send_lock: Mutex::new(()),
                started,
            }),
            recv_task: Mutex::new(None),
        }
    }

    /// Bind the socket and start receiving into `sink`. A second call on a
    /// running endpoint is a no-op.
    pub async fn start(&self, sink: Arc<dyn DatagramSink>) -> TransportResult<()> {
        if *self.inner.started.borrow() {
            return Ok(());
        }

        let socket = bind(&self.inner.config).await?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| TransportError::Bind { source })?;
        info!(addr = %local_addr, "UDP endpoint listening");

        *self.inner.socket.write().await = Some(socket);
        self.inner.started.send_replace(true);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            recv_loop(inner, sink).await;
        });
        *self.recv_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the endpoint: close the socket, end the receive loop and notify
    /// every watcher of the started signal.
    pub async fn stop(&self) {
        if !self.inner.started.send_replace(false) {
            return;
        }
        if let Some(handle) = self.recv_task.lock().await.take() {
            handle.abort();
        }
        *self.inner.socket.write().await = None;
        info!("UDP endpoint stopped");
    }

    pub fn is_started(&self) -> bool {
        *self.inner.started.borrow()
    }

    /// Signal that flips to `false` when the endpoint stops; used by
    /// response waiters to abort cleanly.
    pub fn started_watch(&self) -> watch::Receiver<bool> {
        self.inner.started.subscribe()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let socket = self.inner.socket.read().await.clone()?;
        socket.local_addr().ok()
    }

    /// Send one frame to `addr`. Sends are serialized by a mutex; a short
    /// write is an error because a partial frame is useless to the peer.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> TransportResult<()> {
        let socket = self
            .inner
            .socket
            .read()
            .await
            .clone()
            .ok_or(TransportError::NotStarted)?;

        let _guard = self.inner.send_lock.lock().await;
        let sent = socket
            .send_to(data, addr)
            .await
            .map_err(|source| TransportError::Send { source })?;
        if sent != data.len() {
            return Err(TransportError::PartialSend {
                sent,
                expected: data.len(),
            });
        }
        trace!(%addr, len = data.len(), "sent datagram");
        Ok(())
    }
}

async fn bind(config: &TransportConfig) -> TransportResult<Arc<UdpSocket>> {
    let socket = UdpSocket::bind((config.bind_address, config.port))
        .await
        .map_err(|source| TransportError::Bind { source })?;
    Ok(Arc::new(socket))
}

async fn recv_loop(inner: Arc<Inner>, sink: Arc<dyn DatagramSink>) {
    let mut buf = vec![0u8; inner.config.recv_buffer_size];
    loop {
        if !*inner.started.borrow() {
            return;
        }
        let Some(socket) = inner.socket.read().await.clone() else {
            return;
        };

        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => {
                if len == 0 {
                    continue;
                }
                match Datagram::decode(&buf[..len]) {
                    Ok(Some(datagram)) => sink.datagram_received(datagram, addr).await,
                    Ok(None) => trace!(%addr, len, "ignoring non-protocol datagram"),
                    Err(err) => warn!(%addr, %err, "dropping corrupt datagram"),
                }
            }
            Err(err) => {
                if !*inner.started.borrow() {
                    return;
                }
                warn!(%err, "UDP socket failed, will rebind");
                *inner.socket.write().await = None;
                rebind_until_started(&inner).await;
            }
        }
    }
}

/// Rebind after an unexpected socket failure, retrying on the configured
/// interval for as long as the endpoint is supposed to be running. No
/// offline events are produced here; liveness windows expire on their own
/// if the outage lasts.
async fn rebind_until_started(inner: &Arc<Inner>) {
    loop {
        tokio::time::sleep(inner.config.restart_interval).await;
        if !*inner.started.borrow() {
            return;
        }
        match bind(&inner.config).await {
            Ok(socket) => {
                debug!("UDP endpoint rebound");
                *inner.socket.write().await = Some(socket);
                return;
            }
            Err(err) => warn!(%err, "rebind failed, will retry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use emproto_codec::Command;
    use emproto_types::Serial;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct CollectingSink {
        tx: mpsc::UnboundedSender<(Datagram, SocketAddr)>,
    }

    #[async_trait]
    impl DatagramSink for CollectingSink {
        async fn datagram_received(&self, datagram: Datagram, addr: SocketAddr) {
            let _ = self.tx.send((datagram, addr));
        }
    }

    fn test_config() -> TransportConfig {
        TransportConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            port: 0,
            ..Default::default()
        }
    }

    fn test_datagram() -> Datagram {
        let mut datagram = Datagram::new(Command::HEADING, vec![0x00]);
        datagram.serial = Serial::new("aabbccddeeff0011");
        datagram
    }

    #[tokio::test]
    async fn receives_valid_frames_and_ignores_noise() {
        let endpoint = UdpEndpoint::new(test_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        endpoint.start(Arc::new(CollectingSink { tx })).await.unwrap();
        let addr = endpoint.local_addr().await.unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"definitely not a frame", addr).await.unwrap();
        peer.send_to(&test_datagram().encode().unwrap(), addr)
            .await
            .unwrap();

        let (datagram, from) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(datagram.command, Command::HEADING);
        assert_eq!(from.port(), peer.local_addr().unwrap().port());

        // The garbage datagram was dropped without anything arriving first.
        assert!(rx.try_recv().is_err());

        endpoint.stop().await;
    }

    #[tokio::test]
    async fn sends_frames_to_peer() {
        let endpoint = UdpEndpoint::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        endpoint.start(Arc::new(CollectingSink { tx })).await.unwrap();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let frame = test_datagram().encode().unwrap();
        endpoint
            .send_to(&frame, peer.local_addr().unwrap())
            .await
            .unwrap();

        let mut buf = [0u8; 128];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], frame.as_slice());

        endpoint.stop().await;
    }

    #[tokio::test]
    async fn send_fails_when_stopped() {
        let endpoint = UdpEndpoint::new(test_config());
        let err = endpoint
            .send_to(b"data", "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotStarted));
    }

    #[tokio::test]
    async fn stop_flips_the_started_watch() {
        let endpoint = UdpEndpoint::new(test_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        endpoint.start(Arc::new(CollectingSink { tx })).await.unwrap();

        let mut watch = endpoint.started_watch();
        assert!(*watch.borrow());

        endpoint.stop().await;
        watch.changed().await.unwrap();
        assert!(!*watch.borrow());
    }
}
