//! UDP transport implementation

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use wsn_core::{Channel, WsnError, WsnResult};

/// Largest datagram we read; protocol payloads are a few bytes
pub const MAX_DATAGRAM_SIZE: usize = 1280;

/// UDP transport serving one traffic channel
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    channel: Channel,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr, channel: Channel) -> WsnResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| WsnError::BindFailed {
                port: addr.port(),
                reason: e.to_string(),
            })?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| WsnError::TransportError(e.to_string()))?;

        tracing::debug!(channel = channel.name(), %local_addr, "bound");

        Ok(UdpTransport {
            socket: Arc::new(socket),
            local_addr,
            channel,
        })
    }

    /// Join an IPv6 multicast group on `interface` (0 = kernel default).
    /// Our own multicasts are never looped back.
    pub fn join_group(&self, group: Ipv6Addr, interface: u32) -> WsnResult<()> {
        self.socket
            .join_multicast_v6(&group, interface)
            .map_err(|e| WsnError::MulticastJoinFailed {
                group,
                reason: e.to_string(),
            })?;
        self.disable_multicast_loopback()
            .map_err(|e| WsnError::MulticastJoinFailed {
                group,
                reason: e.to_string(),
            })?;

        tracing::info!(channel = self.channel.name(), %group, "joined multicast group");
        Ok(())
    }

    /// Stop IPv6 multicasts sent from this socket coming back to the host,
    /// so a node never hears its own presence or discovery announcements
    pub fn disable_multicast_loopback(&self) -> WsnResult<()> {
        self.socket
            .set_multicast_loop_v6(false)
            .map_err(|e| WsnError::TransportError(e.to_string()))
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Send raw bytes to a destination
    pub async fn send_bytes_to(&self, bytes: &[u8], dest: SocketAddr) -> WsnResult<()> {
        self.socket
            .send_to(bytes, dest)
            .await
            .map_err(|e| WsnError::TransportError(e.to_string()))?;
        Ok(())
    }

    /// Receive raw bytes (blocking)
    pub async fn recv_bytes_from(&self) -> WsnResult<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let (len, addr) = self
            .socket
            .recv_from(&mut buf)
            .await
            .map_err(|e| WsnError::TransportError(e.to_string()))?;

        Ok((buf[..len].to_vec(), addr))
    }

    /// Get a clone of the socket for concurrent operations
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }
}

/// Datagram tagged with the channel it arrived on
pub type InboundPacket = (Channel, Vec<u8>, SocketAddr);

/// Node inbox receiver
pub type PacketReceiver = mpsc::Receiver<InboundPacket>;

/// Node inbox sender
pub type PacketSender = mpsc::Sender<InboundPacket>;

/// Start a background receive loop feeding `tx`.
/// The loop ends when the receiver is dropped.
pub fn start_receive_loop(transport: &UdpTransport, tx: PacketSender) {
    let socket = transport.socket();
    let channel = transport.channel();

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let packet = buf[..len].to_vec();
                    if tx.send((channel, packet, addr)).await.is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) => {
                    tracing::warn!(channel = channel.name(), "UDP receive error: {}", e);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_transport_bind() {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Channel::ClientData)
            .await
            .unwrap();

        assert_ne!(transport.local_addr().port(), 0);
        assert_eq!(transport.channel(), Channel::ClientData);
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_port() {
        let first = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Channel::Sink)
            .await
            .unwrap();
        let taken = first.local_addr();

        match UdpTransport::bind(taken, Channel::Sink).await {
            Err(WsnError::BindFailed { port, .. }) => assert_eq!(port, taken.port()),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second bind on {taken} succeeded"),
        }
    }

    #[tokio::test]
    async fn test_receive_loop_tags_channel() {
        let rx_side = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Channel::PeerRelay)
            .await
            .unwrap();
        let tx_side = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), Channel::Sink)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        start_receive_loop(&rx_side, tx);

        tx_side
            .send_bytes_to(b"Hello world", rx_side.local_addr())
            .await
            .unwrap();

        let (channel, payload, from) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel, Channel::PeerRelay);
        assert_eq!(payload, b"Hello world".to_vec());
        assert_eq!(from, tx_side.local_addr());
    }

    #[tokio::test]
    async fn test_multicast_loopback_disabled() {
        // Hosts without IPv6 loopback have nothing to check
        let Ok(transport) = UdpTransport::bind("[::1]:0".parse().unwrap(), Channel::Sink).await
        else {
            return;
        };
        transport.socket().set_multicast_loop_v6(true).unwrap();

        transport.disable_multicast_loopback().unwrap();
        assert!(!transport.socket().multicast_loop_v6().unwrap());
    }
}
