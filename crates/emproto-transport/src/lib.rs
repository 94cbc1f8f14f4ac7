//! # EM Protocol Transport
//!
//! UDP transport for the EM charging-station protocol: one socket on the
//! well-known port, one receive loop that decodes frames and hands them to
//! a sink, and one serialized send path. The endpoint survives unexpected
//! socket failures by rebinding on a fixed interval until stopped.

pub mod endpoint;
pub mod error;

pub use endpoint::UdpEndpoint;
pub use error::{TransportError, TransportResult};

use async_trait::async_trait;
use emproto_codec::Datagram;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// UDP port EVSEs listen and broadcast on.
pub const DEFAULT_PORT: u16 = 28376;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Local address to bind; the protocol is IPv4.
    pub bind_address: IpAddr,
    /// Local port to bind; 0 picks an ephemeral port (useful in tests).
    pub port: u16,
    /// Receive buffer size in bytes; frames are far smaller.
    pub recv_buffer_size: usize,
    /// Delay between rebind attempts after an unexpected socket failure.
    pub restart_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            recv_buffer_size: 4096,
            restart_interval: Duration::from_secs(10),
        }
    }
}

/// Receiver of decoded inbound datagrams.
///
/// The receive loop awaits the sink inline, so frame processing keeps the
/// socket's delivery order.
#[async_trait]
pub trait DatagramSink: Send + Sync {
    async fn datagram_received(&self, datagram: Datagram, addr: SocketAddr);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TransportConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.restart_interval, Duration::from_secs(10));
    }
}
