//! WSN Node - Runtime loop implementation

use std::collections::HashMap;
use std::future::Future;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use wsn_core::{
    Action, Channel, ClientConfig, ClusterHeadConfig, Datagram, Destination, MulticastConfig,
    NodeAddress, NodeBehavior, NodeEvent, NodeKind, Outbound, PortMap, WsnError, WsnResult,
};
use wsn_transport::{start_receive_loop, PacketReceiver, UdpTransport};

use crate::TimerTable;

/// Node runtime configuration
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Local address every socket binds to
    pub bind_addr: IpAddr,
    pub ports: PortMap,
    pub multicast: MulticastConfig,
    /// Inbound datagrams buffered ahead of the handler
    pub inbox_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            bind_addr: IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
            ports: PortMap::default(),
            multicast: MulticastConfig::default(),
            inbox_capacity: 256,
        }
    }
}

impl From<&ClusterHeadConfig> for NodeConfig {
    fn from(config: &ClusterHeadConfig) -> Self {
        NodeConfig {
            bind_addr: config.bind_addr,
            ports: config.ports,
            multicast: config.multicast.clone(),
            ..Default::default()
        }
    }
}

impl From<&ClientConfig> for NodeConfig {
    fn from(config: &ClientConfig) -> Self {
        NodeConfig {
            bind_addr: config.bind_addr,
            ports: config.ports,
            multicast: config.multicast.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuntimeStats {
    pub datagrams_in: u64,
    pub datagrams_out: u64,
    pub timers_fired: u64,
    pub send_errors: u64,
    /// Multicast sends skipped because multicast is disabled
    pub multicast_skipped: u64,
}

/// Channels a node listens on
pub fn listen_channels(kind: NodeKind) -> &'static [Channel] {
    match kind {
        NodeKind::ClusterHead => &[Channel::ClientData, Channel::PeerRelay, Channel::PeerGroup],
        NodeKind::Client => &[Channel::Feedback, Channel::Discovery],
    }
}

/// WSN Node - the runtime entity around one state machine
pub struct Node<N> {
    behavior: N,
    config: NodeConfig,
    /// Listening sockets, one per channel
    listeners: HashMap<Channel, UdpTransport>,
    /// Sends on channels we do not listen on
    egress: UdpTransport,
    inbox: PacketReceiver,
    timers: TimerTable,
    stats: RuntimeStats,
}

impl<N: NodeBehavior> Node<N> {
    /// Bind every socket the node needs. Bind and join failures are fatal.
    pub async fn bind(behavior: N, config: NodeConfig) -> WsnResult<Self> {
        let kind = behavior.kind();
        let (tx, inbox) = mpsc::channel(config.inbox_capacity.max(1));

        let mut listeners = HashMap::new();
        for &channel in listen_channels(kind) {
            let addr = SocketAddr::new(config.bind_addr, config.ports.port(channel));
            let transport = UdpTransport::bind(addr, channel).await?;
            if channel.is_multicast() && config.multicast.enabled {
                transport.join_group(config.multicast.group, config.multicast.interface)?;
            }
            start_receive_loop(&transport, tx.clone());
            listeners.insert(channel, transport);
        }

        let egress = UdpTransport::bind(SocketAddr::new(config.bind_addr, 0), Channel::Sink).await?;
        if config.multicast.enabled && config.bind_addr.is_ipv6() {
            egress.disable_multicast_loopback()?;
        }

        info!(?kind, bind = %config.bind_addr, "node sockets ready");

        Ok(Node {
            behavior,
            config,
            listeners,
            egress,
            inbox,
            timers: TimerTable::new(),
            stats: RuntimeStats::default(),
        })
    }

    /// Run until `shutdown` resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> WsnResult<()>
    where
        F: Future<Output = ()>,
    {
        let actions = self.behavior.start();
        self.execute(actions).await;

        tokio::pin!(shutdown);
        loop {
            let next = self.timers.next().map(|(_, at)| at);

            tokio::select! {
                _ = &mut shutdown => {
                    info!(kind = ?self.behavior.kind(), "node shutting down");
                    return Ok(());
                }
                packet = self.inbox.recv() => {
                    let Some((channel, payload, from)) = packet else {
                        return Err(WsnError::ChannelClosed);
                    };
                    self.stats.datagrams_in += 1;
                    let datagram = Datagram::new(channel, NodeAddress::from(from), payload);
                    let actions = self.behavior.on_event(NodeEvent::Datagram(datagram));
                    self.execute(actions).await;
                }
                _ = sleep_until(next) => {
                    for timer in self.timers.take_due(Instant::now()) {
                        self.stats.timers_fired += 1;
                        let actions = self.behavior.on_event(NodeEvent::Timer(timer));
                        self.execute(actions).await;
                    }
                }
            }
        }
    }

    /// Run forever
    pub async fn run(&mut self) -> WsnResult<()> {
        self.run_until(std::future::pending()).await
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Arm { timer, after } => self.timers.arm(timer, deadline(after)),
                Action::Send(out) => self.send(out).await,
            }
        }
    }

    async fn send(&mut self, out: Outbound) {
        let Some(dest) = self.resolve(&out) else {
            debug!(channel = out.channel.name(), "multicast disabled, send skipped");
            self.stats.multicast_skipped += 1;
            return;
        };

        let transport = self.listeners.get(&out.channel).unwrap_or(&self.egress);
        match transport.send_bytes_to(&out.payload, dest).await {
            Ok(()) => self.stats.datagrams_out += 1,
            Err(e) => {
                // Fire-and-forget: no retry
                warn!(channel = out.channel.name(), %dest, "send failed: {}", e);
                self.stats.send_errors += 1;
            }
        }
    }

    /// Socket address for an outbound datagram
    pub fn resolve(&self, out: &Outbound) -> Option<SocketAddr> {
        let port = self.config.ports.port(out.channel);
        match out.dest {
            Destination::Node(addr) => Some(addr.with_port(port)),
            Destination::Group if self.config.multicast.enabled => {
                let multicast = &self.config.multicast;
                Some(SocketAddr::V6(SocketAddrV6::new(
                    multicast.group,
                    port,
                    0,
                    multicast.interface,
                )))
            }
            Destination::Group => None,
        }
    }

    pub fn behavior(&self) -> &N {
        &self.behavior
    }

    pub fn timers(&self) -> &TimerTable {
        &self.timers
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }
}

fn deadline(after: Duration) -> Instant {
    Instant::now() + after
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
