//! Message router
//!
//! Classifies every datagram a cluster head receives and dispatches it:
//! election traffic to the election engine, application data to the sink
//! or the relay CH, followed by an RSSI feedback reply to the sender.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use wsn_core::{
    classify, encode_rssi, Action, Channel, Datagram, LinkQualitySource, NodeAddress, Outbound,
    PayloadClass,
};

use crate::{ChRole, ElectionEngine};

/// Router counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub presence: u64,
    pub values: u64,
    pub app_data: u64,
    pub to_sink: u64,
    pub relayed: u64,
    pub feedback_sent: u64,
    /// Passive with no relay target
    pub dropped_no_target: u64,
    /// Empty payloads and traffic on the wrong channel
    pub ignored: u64,
}

/// Where application data went
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Forward {
    Sink,
    Relay(NodeAddress),
    Dropped,
}

/// Routing state of one cluster head
#[derive(Clone, Debug)]
pub struct MessageRouter {
    presence_marker: String,
    sink: NodeAddress,
    /// Last RSSI seen per data sender
    senders: HashMap<NodeAddress, i16>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new(presence_marker: impl Into<String>, sink: NodeAddress) -> Self {
        MessageRouter {
            presence_marker: presence_marker.into(),
            sink,
            senders: HashMap::new(),
            stats: RouterStats::default(),
        }
    }

    /// Route one datagram
    pub fn route<L: LinkQualitySource>(
        &mut self,
        datagram: &Datagram,
        election: &mut ElectionEngine,
        link_quality: &mut L,
    ) -> Vec<Action> {
        let from = datagram.from;

        match classify(&datagram.payload, &self.presence_marker) {
            PayloadClass::Empty => {
                debug!(peer = %from, channel = datagram.channel.name(), "empty datagram");
                self.stats.ignored += 1;
                Vec::new()
            }
            PayloadClass::Presence | PayloadClass::PeerValue(_)
                if datagram.channel != Channel::PeerGroup =>
            {
                warn!(
                    peer = %from,
                    channel = datagram.channel.name(),
                    "election traffic outside the peer group, dropped"
                );
                self.stats.ignored += 1;
                Vec::new()
            }
            PayloadClass::Presence => {
                self.stats.presence += 1;
                election.on_presence(from);
                Vec::new()
            }
            PayloadClass::PeerValue(value) => {
                self.stats.values += 1;
                election.on_peer_value(from, value);
                Vec::new()
            }
            PayloadClass::AppData(data) => match datagram.channel {
                Channel::ClientData | Channel::PeerRelay => {
                    self.route_data(datagram.channel, from, data, election.role(), link_quality)
                }
                other => {
                    debug!(peer = %from, channel = other.name(), "data on a non-data channel");
                    self.stats.ignored += 1;
                    Vec::new()
                }
            },
        }
    }

    fn route_data<L: LinkQualitySource>(
        &mut self,
        channel: Channel,
        from: NodeAddress,
        data: &[u8],
        role: ChRole,
        link_quality: &mut L,
    ) -> Vec<Action> {
        self.stats.app_data += 1;
        let sample = link_quality.sample(from);
        self.senders.insert(from, sample.rssi);
        info!(
            peer = %from,
            rssi = sample.rssi,
            data = %String::from_utf8_lossy(data),
            "DATA recv"
        );

        let mut actions = Vec::with_capacity(2);
        match Self::forward_target(channel, role) {
            Forward::Sink => {
                debug!(sink = %self.sink, "forwarding to sink");
                self.stats.to_sink += 1;
                actions.push(Action::Send(Outbound::unicast(Channel::Sink, self.sink, data)));
            }
            Forward::Relay(to) => {
                debug!(relay_to = %to, "forwarding to active cluster head");
                self.stats.relayed += 1;
                actions.push(Action::Send(Outbound::unicast(Channel::PeerRelay, to, data)));
            }
            Forward::Dropped => {
                warn!(peer = %from, "passive without relay target, data dropped");
                self.stats.dropped_no_target += 1;
            }
        }

        self.stats.feedback_sent += 1;
        actions.push(Action::Send(Outbound::unicast(
            Channel::Feedback,
            from,
            encode_rssi(sample.rssi),
        )));
        actions
    }

    /// Data that already took its relay hop goes straight to the sink
    pub fn forward_target(channel: Channel, role: ChRole) -> Forward {
        if channel == Channel::PeerRelay {
            return Forward::Sink;
        }
        match role {
            ChRole::Active => Forward::Sink,
            ChRole::Passive { relay_to: Some(to) } => Forward::Relay(to),
            ChRole::Passive { relay_to: None } => Forward::Dropped,
        }
    }

    /// Last RSSI per data sender
    pub fn senders(&self) -> &HashMap<NodeAddress, i16> {
        &self.senders
    }

    pub fn sink(&self) -> NodeAddress {
        self.sink
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }
}
