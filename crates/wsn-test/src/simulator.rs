//! Virtual-time network simulator
//!
//! Runs the real `ClusterHead` and `SensorClient` state machines against
//! each other over `ChaosLink`s. Time only moves from one event to the
//! next, so an hour of protocol time costs a few milliseconds.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::trace;

use wsn_client::SensorClient;
use wsn_cluster::ClusterHead;
use wsn_core::{
    Action, Channel, ClientConfig, ClusterHeadConfig, Datagram, Destination, NodeAddress,
    NodeBehavior, NodeEvent, NodeKind, Outbound, TimerId,
};
use wsn_runtime::listen_channels;

use crate::chaos::{ChaosConfig, ChaosLink};
use crate::radio::SimRadio;

/// Transmit level the path RSSI table refers to
pub const FULL_POWER: u8 = 31;

pub type SimClusterHead = ClusterHead<SimRadio, StdRng>;
pub type SimClient = SensorClient<SimRadio, SimRadio, StdRng>;

enum SimBehavior {
    Head(SimClusterHead),
    Client(SimClient),
}

impl SimBehavior {
    fn node(&mut self) -> &mut dyn NodeBehavior {
        match self {
            SimBehavior::Head(head) => head,
            SimBehavior::Client(client) => client,
        }
    }

    fn kind(&self) -> NodeKind {
        match self {
            SimBehavior::Head(_) => NodeKind::ClusterHead,
            SimBehavior::Client(_) => NodeKind::Client,
        }
    }
}

struct SimNode {
    addr: NodeAddress,
    behavior: SimBehavior,
    radio: SimRadio,
    timers: HashMap<TimerId, Duration>,
}

/// Datagram that reached the sink
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SinkRecord {
    pub at: Duration,
    pub from: NodeAddress,
    pub payload: Vec<u8>,
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Node(usize),
    Sink,
}

struct InFlight {
    at: Duration,
    seq: u64,
    target: Target,
    datagram: Datagram,
    rssi: i16,
}

impl PartialEq for InFlight {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for InFlight {}

impl PartialOrd for InFlight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InFlight {
    // Min-heap on (at, seq)
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

enum Next {
    Delivery,
    Timer(usize, TimerId),
}

/// Network simulator for multi-node testing
pub struct NetworkSimulator {
    nodes: Vec<SimNode>,
    index: HashMap<NodeAddress, usize>,
    links: HashMap<(NodeAddress, NodeAddress), ChaosLink>,
    default_link: ChaosConfig,
    /// RSSI at full power, per directed pair
    path_rssi: HashMap<(NodeAddress, NodeAddress), i16>,
    default_rssi: i16,
    in_flight: BinaryHeap<InFlight>,
    sink_log: Vec<SinkRecord>,
    now: Duration,
    seed: u64,
    seed_counter: u64,
    next_seq: u64,
    started: bool,
}

impl NetworkSimulator {
    pub fn new(default_link: ChaosConfig, seed: u64) -> Self {
        NetworkSimulator {
            nodes: Vec::new(),
            index: HashMap::new(),
            links: HashMap::new(),
            default_link,
            path_rssi: HashMap::new(),
            default_rssi: -75,
            in_flight: BinaryHeap::new(),
            sink_log: Vec::new(),
            now: Duration::ZERO,
            seed,
            seed_counter: 0,
            next_seq: 0,
            started: false,
        }
    }

    fn next_seed(&mut self) -> u64 {
        self.seed_counter += 1;
        self.seed.wrapping_mul(6364136223846793005).wrapping_add(self.seed_counter)
    }

    fn next_addr(&self) -> NodeAddress {
        NodeAddress::local(self.nodes.len() as u16 + 1)
    }

    fn push_node(&mut self, addr: NodeAddress, behavior: SimBehavior, radio: SimRadio) {
        self.index.insert(addr, self.nodes.len());
        self.nodes.push(SimNode {
            addr,
            behavior,
            radio,
            timers: HashMap::new(),
        });
    }

    /// Add a cluster head; it starts with the other nodes
    pub fn add_cluster_head(&mut self, config: ClusterHeadConfig) -> NodeAddress {
        let addr = self.next_addr();
        let radio = SimRadio::new(FULL_POWER);
        let rng = StdRng::seed_from_u64(self.next_seed());
        let head = ClusterHead::new(config, radio.clone(), rng);
        self.push_node(addr, SimBehavior::Head(head), radio);
        addr
    }

    /// Add a sensor client; it starts with the other nodes
    pub fn add_client(&mut self, config: ClientConfig) -> NodeAddress {
        let addr = self.next_addr();
        let radio = SimRadio::new(config.power.initial_level);
        let rng = StdRng::seed_from_u64(self.next_seed());
        let client = SensorClient::new(config, radio.clone(), radio.clone(), rng);
        self.push_node(addr, SimBehavior::Client(client), radio);
        addr
    }

    /// RSSI between two nodes at full transmit power, both directions
    pub fn set_path_rssi(&mut self, a: NodeAddress, b: NodeAddress, rssi: i16) {
        self.path_rssi.insert((a, b), rssi);
        self.path_rssi.insert((b, a), rssi);
    }

    pub fn set_default_rssi(&mut self, rssi: i16) {
        self.default_rssi = rssi;
    }

    /// Override the conditions of one directed link
    pub fn set_link_config(&mut self, from: NodeAddress, to: NodeAddress, config: ChaosConfig) {
        let seed = self.next_seed();
        self.links.insert((from, to), ChaosLink::new(config, seed));
    }

    /// RSSI the receiver reads for a datagram sent now. Each transmit
    /// level below full power costs 1 dB.
    fn rssi(&self, from: usize, to: NodeAddress) -> i16 {
        let node = &self.nodes[from];
        let base = self
            .path_rssi
            .get(&(node.addr, to))
            .copied()
            .unwrap_or(self.default_rssi);
        let backoff = (FULL_POWER as i16 - node.radio.tx_level() as i16).max(0);
        base - backoff
    }

    fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for i in 0..self.nodes.len() {
            let actions = self.nodes[i].behavior.node().start();
            self.execute(i, actions);
        }
    }

    fn execute(&mut self, from: usize, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Arm { timer, after } => {
                    self.nodes[from].timers.insert(timer, self.now + after);
                }
                Action::Send(out) => self.send(from, out),
            }
        }
    }

    fn receivers(&self, from: usize, out: &Outbound) -> Vec<(Target, NodeAddress)> {
        let listens = |i: usize| listen_channels(self.nodes[i].behavior.kind()).contains(&out.channel);
        match out.dest {
            Destination::Group => (0..self.nodes.len())
                .filter(|&i| i != from && listens(i))
                .map(|i| (Target::Node(i), self.nodes[i].addr))
                .collect(),
            Destination::Node(addr) if out.channel == Channel::Sink => vec![(Target::Sink, addr)],
            Destination::Node(addr) => match self.index.get(&addr) {
                Some(&i) if listens(i) => vec![(Target::Node(i), addr)],
                _ => {
                    trace!(to = %addr, channel = out.channel.name(), "no listener, datagram lost");
                    Vec::new()
                }
            },
        }
    }

    fn send(&mut self, from: usize, out: Outbound) {
        let from_addr = self.nodes[from].addr;
        for (target, to) in self.receivers(from, &out) {
            let rssi = self.rssi(from, to);
            let delays = match self.links.get_mut(&(from_addr, to)) {
                Some(link) => link.transmit(),
                None => {
                    let mut link = ChaosLink::new(self.default_link.clone(), self.next_seed());
                    let delays = link.transmit();
                    self.links.insert((from_addr, to), link);
                    delays
                }
            };

            for delay in delays {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.in_flight.push(InFlight {
                    at: self.now + delay,
                    seq,
                    target,
                    datagram: Datagram::new(out.channel, from_addr, out.payload.clone()),
                    rssi,
                });
            }
        }
    }

    fn next_timer(&self) -> Option<(Duration, usize, TimerId)> {
        self.nodes
            .iter()
            .enumerate()
            .flat_map(|(i, node)| node.timers.iter().map(move |(timer, at)| (*at, i, *timer)))
            .min()
    }

    fn next_event(&self) -> Option<(Duration, Next)> {
        let delivery = self.in_flight.peek().map(|f| f.at);
        let timer = self.next_timer();
        match (delivery, timer) {
            (Some(d), Some((t, i, timer))) if t < d => Some((t, Next::Timer(i, timer))),
            (Some(d), _) => Some((d, Next::Delivery)),
            (None, Some((t, i, timer))) => Some((t, Next::Timer(i, timer))),
            (None, None) => None,
        }
    }

    /// Run until virtual time `end`
    pub fn run_until(&mut self, end: Duration) {
        self.start();

        while let Some((at, next)) = self.next_event() {
            if at > end {
                break;
            }
            self.now = at;

            match next {
                Next::Delivery => {
                    let Some(flight) = self.in_flight.pop() else {
                        break;
                    };
                    self.deliver(flight);
                }
                Next::Timer(i, timer) => {
                    self.nodes[i].timers.remove(&timer);
                    let actions = self.nodes[i].behavior.node().on_event(NodeEvent::Timer(timer));
                    self.execute(i, actions);
                }
            }
        }

        self.now = self.now.max(end);
    }

    /// Run for `dt` more virtual time
    pub fn run_for(&mut self, dt: Duration) {
        self.run_until(self.now + dt);
    }

    fn deliver(&mut self, flight: InFlight) {
        match flight.target {
            Target::Sink => self.sink_log.push(SinkRecord {
                at: flight.at,
                from: flight.datagram.from,
                payload: flight.datagram.payload,
            }),
            Target::Node(i) => {
                self.nodes[i].radio.latch_rssi(flight.rssi);
                let actions = self.nodes[i]
                    .behavior
                    .node()
                    .on_event(NodeEvent::Datagram(flight.datagram));
                self.execute(i, actions);
            }
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn cluster_head(&self, addr: NodeAddress) -> Option<&SimClusterHead> {
        match &self.nodes.get(*self.index.get(&addr)?)?.behavior {
            SimBehavior::Head(head) => Some(head),
            SimBehavior::Client(_) => None,
        }
    }

    pub fn client(&self, addr: NodeAddress) -> Option<&SimClient> {
        match &self.nodes.get(*self.index.get(&addr)?)?.behavior {
            SimBehavior::Client(client) => Some(client),
            SimBehavior::Head(_) => None,
        }
    }

    pub fn radio(&self, addr: NodeAddress) -> Option<&SimRadio> {
        self.index.get(&addr).map(|&i| &self.nodes[i].radio)
    }

    pub fn cluster_heads(&self) -> Vec<NodeAddress> {
        self.addrs(NodeKind::ClusterHead)
    }

    pub fn clients(&self) -> Vec<NodeAddress> {
        self.addrs(NodeKind::Client)
    }

    fn addrs(&self, kind: NodeKind) -> Vec<NodeAddress> {
        self.nodes
            .iter()
            .filter(|n| n.behavior.kind() == kind)
            .map(|n| n.addr)
            .collect()
    }

    /// Everything the sink received, in arrival order
    pub fn sink_log(&self) -> &[SinkRecord] {
        &self.sink_log
    }
}

/// Test scenario builder
pub struct ScenarioBuilder {
    cluster_heads: usize,
    clients: usize,
    link: ChaosConfig,
    head_config: ClusterHeadConfig,
    client_config: ClientConfig,
    seed: u64,
}

impl ScenarioBuilder {
    /// Fast timers, perfect links
    pub fn new() -> Self {
        ScenarioBuilder {
            cluster_heads: 0,
            clients: 0,
            link: ChaosConfig::perfect(),
            head_config: ClusterHeadConfig::fast(),
            client_config: ClientConfig::fast(),
            seed: 0,
        }
    }

    pub fn with_cluster_heads(mut self, count: usize) -> Self {
        self.cluster_heads = count;
        self
    }

    pub fn with_clients(mut self, count: usize) -> Self {
        self.clients = count;
        self
    }

    pub fn with_link(mut self, config: ChaosConfig) -> Self {
        self.link = config;
        self
    }

    pub fn with_head_config(mut self, config: ClusterHeadConfig) -> Self {
        self.head_config = config;
        self
    }

    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the simulator. Cluster heads come first.
    pub fn build(self) -> (NetworkSimulator, Vec<NodeAddress>, Vec<NodeAddress>) {
        let mut sim = NetworkSimulator::new(self.link, self.seed);
        let heads = (0..self.cluster_heads)
            .map(|_| sim.add_cluster_head(self.head_config.clone()))
            .collect();
        let clients = (0..self.clients)
            .map(|_| sim.add_client(self.client_config.clone()))
            .collect();
        (sim, heads, clients)
    }
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}
