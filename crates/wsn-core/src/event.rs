//! Node events and actions
//!
//! Every node is a state machine driven by a single event loop. The loop
//! waits for exactly two things: the next inbound datagram and the next timer
//! expiry. Handlers answer with actions (sends and timer arms) that the loop
//! executes.

use std::time::Duration;

use crate::{Channel, NodeAddress};

/// Timers a node can arm. Re-arming a pending timer supersedes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// CH: draw this round's random value (and announce presence the first time)
    DrawValue,
    /// CH: multicast the drawn value to peers
    ValueBroadcast,
    /// CH: multicast the discovery marker to clients
    Discovery,
    /// Client: periodic report trigger
    ReportPeriod,
    /// Client: backoff before the report actually goes out
    ReportBackoff,
}

/// Datagram handed to a node
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
    /// Channel the datagram arrived on
    pub channel: Channel,
    /// Originator
    pub from: NodeAddress,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(channel: Channel, from: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Datagram {
            channel,
            from,
            payload: payload.into(),
        }
    }
}

/// Inbound event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    Timer(TimerId),
    Datagram(Datagram),
}

/// Where an outbound datagram goes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A single node, on the channel's well-known port
    Node(NodeAddress),
    /// The multicast group serving the channel
    Group,
}

/// Outbound datagram
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outbound {
    pub channel: Channel,
    pub dest: Destination,
    pub payload: Vec<u8>,
}

impl Outbound {
    pub fn unicast(channel: Channel, to: NodeAddress, payload: impl Into<Vec<u8>>) -> Self {
        Outbound {
            channel,
            dest: Destination::Node(to),
            payload: payload.into(),
        }
    }

    pub fn multicast(channel: Channel, payload: impl Into<Vec<u8>>) -> Self {
        Outbound {
            channel,
            dest: Destination::Group,
            payload: payload.into(),
        }
    }
}

/// Side effect requested by a handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Fire-and-forget send
    Send(Outbound),
    /// Arm (or re-arm) a one-shot timer
    Arm { timer: TimerId, after: Duration },
}

impl Action {
    #[inline]
    pub fn arm(timer: TimerId, after: Duration) -> Self {
        Action::Arm { timer, after }
    }

    /// The outbound datagram, if this is a send
    pub fn as_send(&self) -> Option<&Outbound> {
        match self {
            Action::Send(out) => Some(out),
            Action::Arm { .. } => None,
        }
    }
}

/// Which side of the overlay a node plays
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    ClusterHead,
    Client,
}

/// A node state machine
pub trait NodeBehavior {
    fn kind(&self) -> NodeKind;

    /// Actions to run once at startup (initial timer arms)
    fn start(&mut self) -> Vec<Action>;

    /// Handle one event
    fn on_event(&mut self, event: NodeEvent) -> Vec<Action>;
}
