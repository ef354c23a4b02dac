//! Cluster head node
//!
//! Three timers drive a cluster head:
//! - DrawValue: draw the round's value; the first expiry also multicasts
//!   the presence marker to the peer group
//! - ValueBroadcast: multicast the drawn value to the peer group
//! - Discovery: multicast the discovery marker to clients
//!
//! Datagrams go through the message router.

use rand::Rng;
use tracing::debug;

use wsn_core::{
    encode_value, Action, Channel, ClusterHeadConfig, Datagram, LinkQualitySource, NodeBehavior,
    NodeEvent, NodeKind, Outbound, TimerId,
};

use crate::{ChRole, ElectionEngine, MessageRouter};

/// Cluster head state machine
pub struct ClusterHead<L, R> {
    config: ClusterHeadConfig,
    election: ElectionEngine,
    router: MessageRouter,
    link_quality: L,
    rng: R,
    presence_announced: bool,
}

impl<L: LinkQualitySource, R: Rng> ClusterHead<L, R> {
    pub fn new(config: ClusterHeadConfig, link_quality: L, rng: R) -> Self {
        let router = MessageRouter::new(config.markers.presence.clone(), config.sink);
        ClusterHead {
            config,
            election: ElectionEngine::new(),
            router,
            link_quality,
            rng,
            presence_announced: false,
        }
    }

    fn on_timer(&mut self, timer: TimerId) -> Vec<Action> {
        let election = &self.config.election;
        match timer {
            TimerId::DrawValue => {
                let mut actions = Vec::with_capacity(2);
                if !self.presence_announced {
                    self.presence_announced = true;
                    debug!("announcing presence to peers");
                    actions.push(Action::Send(Outbound::multicast(
                        Channel::PeerGroup,
                        self.config.markers.presence.as_bytes(),
                    )));
                }
                self.election.draw(&mut self.rng, election.value_range());
                actions.push(Action::arm(TimerId::DrawValue, election.draw_interval));
                actions
            }
            TimerId::ValueBroadcast => {
                debug!(value = self.election.own_value(), "sending CH multicast for CH election");
                vec![
                    Action::Send(Outbound::multicast(
                        Channel::PeerGroup,
                        encode_value(self.election.own_value()),
                    )),
                    Action::arm(TimerId::ValueBroadcast, election.broadcast_interval),
                ]
            }
            TimerId::Discovery => {
                debug!("sending multicast to clients to let them select the best CH");
                vec![
                    Action::Send(Outbound::multicast(
                        Channel::Discovery,
                        self.config.markers.discovery.as_bytes(),
                    )),
                    Action::arm(TimerId::Discovery, election.discovery_interval),
                ]
            }
            TimerId::ReportPeriod | TimerId::ReportBackoff => Vec::new(),
        }
    }

    fn on_datagram(&mut self, datagram: Datagram) -> Vec<Action> {
        self.router
            .route(&datagram, &mut self.election, &mut self.link_quality)
    }

    pub fn role(&self) -> ChRole {
        self.election.role()
    }

    pub fn election(&self) -> &ElectionEngine {
        &self.election
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn config(&self) -> &ClusterHeadConfig {
        &self.config
    }
}

impl<L: LinkQualitySource, R: Rng> NodeBehavior for ClusterHead<L, R> {
    fn kind(&self) -> NodeKind {
        NodeKind::ClusterHead
    }

    fn start(&mut self) -> Vec<Action> {
        let election = &self.config.election;
        vec![
            Action::arm(TimerId::DrawValue, election.draw_first),
            Action::arm(TimerId::ValueBroadcast, election.broadcast_first),
            Action::arm(TimerId::Discovery, election.discovery_first),
        ]
    }

    fn on_event(&mut self, event: NodeEvent) -> Vec<Action> {
        match event {
            NodeEvent::Timer(timer) => self.on_timer(timer),
            NodeEvent::Datagram(datagram) => self.on_datagram(datagram),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wsn_core::{Destination, NodeAddress, StaticLinkQuality};

    fn head() -> ClusterHead<StaticLinkQuality, StdRng> {
        ClusterHead::new(
            ClusterHeadConfig::default(),
            StaticLinkQuality::new(-68),
            StdRng::seed_from_u64(7),
        )
    }

    fn payloads(actions: &[Action]) -> Vec<(Channel, Destination, String)> {
        actions
            .iter()
            .filter_map(Action::as_send)
            .map(|o| {
                (
                    o.channel,
                    o.dest,
                    String::from_utf8_lossy(&o.payload).into_owned(),
                )
            })
            .collect()
    }

    #[test]
    fn test_start_arms_three_phases() {
        let mut ch = head();
        let actions = ch.start();
        let election = &ch.config().election;
        assert_eq!(
            actions,
            vec![
                Action::arm(TimerId::DrawValue, election.draw_first),
                Action::arm(TimerId::ValueBroadcast, election.broadcast_first),
                Action::arm(TimerId::Discovery, election.discovery_first),
            ]
        );
    }

    #[test]
    fn test_presence_marker_sent_once() {
        let mut ch = head();
        let first = ch.on_event(NodeEvent::Timer(TimerId::DrawValue));
        assert_eq!(
            payloads(&first),
            vec![(Channel::PeerGroup, Destination::Group, "A".to_string())]
        );
        assert!(first.contains(&Action::arm(
            TimerId::DrawValue,
            ch.config().election.draw_interval
        )));

        let second = ch.on_event(NodeEvent::Timer(TimerId::DrawValue));
        assert!(payloads(&second).is_empty());
    }

    #[test]
    fn test_broadcast_sends_drawn_value() {
        let mut ch = head();
        ch.on_event(NodeEvent::Timer(TimerId::DrawValue));
        let value = ch.election().own_value();
        assert!((1..=1000).contains(&value));

        let actions = ch.on_event(NodeEvent::Timer(TimerId::ValueBroadcast));
        assert_eq!(
            payloads(&actions),
            vec![(Channel::PeerGroup, Destination::Group, value.to_string())]
        );
    }

    #[test]
    fn test_discovery_announcement() {
        let mut ch = head();
        let actions = ch.on_event(NodeEvent::Timer(TimerId::Discovery));
        assert_eq!(
            payloads(&actions),
            vec![(Channel::Discovery, Destination::Group, "CH".to_string())]
        );
    }

    #[test]
    fn test_client_timers_ignored() {
        let mut ch = head();
        assert!(ch.on_event(NodeEvent::Timer(TimerId::ReportPeriod)).is_empty());
        assert!(ch.on_event(NodeEvent::Timer(TimerId::ReportBackoff)).is_empty());
    }

    #[test]
    fn test_hello_from_client_reaches_sink_with_feedback() {
        let mut ch = head();
        let client = NodeAddress::local(42);
        let actions = ch.on_event(NodeEvent::Datagram(Datagram::new(
            Channel::ClientData,
            client,
            "hello",
        )));

        let sink = ch.config().sink;
        assert_eq!(
            payloads(&actions),
            vec![
                (Channel::Sink, Destination::Node(sink), "hello".to_string()),
                (Channel::Feedback, Destination::Node(client), "-68".to_string()),
            ]
        );
    }

    #[test]
    fn test_loses_election_then_relays() {
        let mut ch = head();
        let rival = NodeAddress::local(2);

        ch.on_event(NodeEvent::Datagram(Datagram::new(
            Channel::PeerGroup,
            rival,
            "A",
        )));
        ch.on_event(NodeEvent::Timer(TimerId::DrawValue));
        let own = ch.election().own_value();
        // Rival above any own value in range wins
        ch.on_event(NodeEvent::Datagram(Datagram::new(
            Channel::PeerGroup,
            rival,
            (own + 1000).to_string(),
        )));
        assert_eq!(ch.role(), ChRole::Passive { relay_to: Some(rival) });

        let actions = ch.on_event(NodeEvent::Datagram(Datagram::new(
            Channel::ClientData,
            NodeAddress::local(42),
            "Hello world",
        )));
        assert_eq!(payloads(&actions)[0].0, Channel::PeerRelay);
        assert_eq!(payloads(&actions)[0].1, Destination::Node(rival));
    }
}
