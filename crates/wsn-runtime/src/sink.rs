//! Sink collector
//!
//! Stand-in for the border router: receives whatever active cluster heads
//! forward on the sink port and logs it.

use std::future::Future;
use std::net::SocketAddr;

use tracing::info;

use wsn_core::{Channel, NodeAddress, WsnResult};
use wsn_transport::UdpTransport;

/// One datagram delivered to the sink
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub from: NodeAddress,
    pub payload: Vec<u8>,
}

pub struct SinkCollector {
    transport: UdpTransport,
    received: u64,
}

impl SinkCollector {
    pub async fn bind(addr: SocketAddr) -> WsnResult<Self> {
        let transport = UdpTransport::bind(addr, Channel::Sink).await?;
        info!(addr = %transport.local_addr(), "sink listening");
        Ok(SinkCollector {
            transport,
            received: 0,
        })
    }

    /// Wait for the next delivery
    pub async fn recv(&mut self) -> WsnResult<Delivery> {
        let (payload, from) = self.transport.recv_bytes_from().await?;
        self.received += 1;
        let from = NodeAddress::from(from);
        info!(
            %from,
            data = %String::from_utf8_lossy(&payload),
            "data received"
        );
        Ok(Delivery { from, payload })
    }

    /// Log deliveries until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> WsnResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                delivery = self.recv() => {
                    if let Err(e) = delivery {
                        tracing::warn!("sink receive error: {}", e);
                    }
                }
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}
