//! Cluster head election
//!
//! One round per cycle, no coordinator:
//! 1. Presence: each CH multicasts the presence marker once; every CH
//!    counts the markers it hears as `expected_peers`.
//! 2. Value: each CH draws a random value and multicasts it.
//! 3. Collection: peer values are kept in arrival order until one value
//!    per expected peer has arrived.
//! 4. Decision: `threshold = (peer sum + own) / (peers + 1)`. A CH whose
//!    own value reaches the threshold is active and talks to the sink;
//!    the others relay through the first peer (arrival order) whose value
//!    reaches it.
//!
//! Rounds carry no identifier. A value arriving after a round closed opens
//! the next one.

use std::ops::RangeInclusive;

use rand::Rng;
use tracing::{debug, info, warn};

use wsn_core::NodeAddress;

/// A peer's election value
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerValue {
    pub value: u32,
    pub addr: NodeAddress,
}

/// Role of a cluster head until the next round closes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ChRole {
    /// May forward directly to the sink
    #[default]
    Active,
    /// Must relay through `relay_to`. `None` when no peer qualified.
    Passive { relay_to: Option<NodeAddress> },
}

impl ChRole {
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, ChRole::Active)
    }

    /// Relay target of a passive CH
    pub fn relay_to(self) -> Option<NodeAddress> {
        match self {
            ChRole::Active => None,
            ChRole::Passive { relay_to } => relay_to,
        }
    }
}

/// Result of a closed round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundOutcome {
    pub own_value: u32,
    pub peers: u32,
    /// Sum of peer values plus own value
    pub total: u64,
    pub threshold: u32,
    pub role: ChRole,
}

/// Decide a round from our value and the peer values in arrival order
pub fn decide(own_value: u32, collected: &[PeerValue]) -> RoundOutcome {
    let peers = collected.len() as u32;
    let total = collected.iter().map(|p| p.value as u64).sum::<u64>() + own_value as u64;
    let threshold = (total / (peers as u64 + 1)) as u32;

    let role = if own_value >= threshold {
        ChRole::Active
    } else {
        // First qualifying peer, not the largest
        let relay_to = collected
            .iter()
            .find(|p| p.value >= threshold)
            .map(|p| p.addr);
        ChRole::Passive { relay_to }
    };

    RoundOutcome {
        own_value,
        peers,
        total,
        threshold,
        role,
    }
}

/// Live election round
#[derive(Clone, Debug, Default)]
pub struct ElectionRound {
    own_value: u32,
    collected: Vec<PeerValue>,
    running_sum: u64,
}

impl ElectionRound {
    pub fn new(own_value: u32) -> Self {
        ElectionRound {
            own_value,
            collected: Vec::new(),
            running_sum: 0,
        }
    }

    pub fn push(&mut self, peer: PeerValue) {
        self.running_sum += peer.value as u64;
        self.collected.push(peer);
    }

    pub fn len(&self) -> usize {
        self.collected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }

    pub fn collected(&self) -> &[PeerValue] {
        &self.collected
    }

    /// Sum of the peer values collected so far
    pub fn running_sum(&self) -> u64 {
        self.running_sum
    }

    pub fn own_value(&self) -> u32 {
        self.own_value
    }

    fn close(self) -> RoundOutcome {
        decide(self.own_value, &self.collected)
    }
}

/// Election state of one cluster head
#[derive(Clone, Debug, Default)]
pub struct ElectionEngine {
    /// Presence markers heard so far. Never reset: the marker goes out
    /// once per node lifetime, so the count carries over between rounds.
    expected_peers: u32,
    /// Latest draw, the value we announce and decide with
    own_value: u32,
    round: Option<ElectionRound>,
    role: ChRole,
    rounds_closed: u64,
    last_outcome: Option<RoundOutcome>,
}

impl ElectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peer announced its presence
    pub fn on_presence(&mut self, from: NodeAddress) {
        self.expected_peers += 1;
        debug!(peer = %from, expected_peers = self.expected_peers, "peer presence");
    }

    /// Draw this cycle's value. With no peers the round closes right away.
    pub fn draw<R: Rng>(&mut self, rng: &mut R, range: RangeInclusive<u32>) -> u32 {
        let value = rng.gen_range(range);
        self.own_value = value;
        if let Some(round) = self.round.as_mut() {
            round.own_value = value;
        }
        debug!(value, "drew election value");

        if self.expected_peers == 0 {
            let round = self.round.take().unwrap_or_else(|| ElectionRound::new(value));
            self.finish(round);
        }
        value
    }

    /// A peer's value arrived. Returns the outcome when it closed the round.
    pub fn on_peer_value(&mut self, from: NodeAddress, value: u32) -> Option<RoundOutcome> {
        if self.expected_peers == 0 {
            warn!(peer = %from, value, "election value from an unannounced peer, dropped");
            return None;
        }

        let own_value = self.own_value;
        let round = self
            .round
            .get_or_insert_with(|| ElectionRound::new(own_value));
        round.push(PeerValue { value, addr: from });
        debug!(
            peer = %from,
            value,
            collected = round.len(),
            expected_peers = self.expected_peers,
            "peer value"
        );

        if round.len() as u32 >= self.expected_peers {
            let round = self.round.take()?;
            return Some(self.finish(round));
        }
        None
    }

    fn finish(&mut self, round: ElectionRound) -> RoundOutcome {
        let outcome = round.close();
        self.role = outcome.role;
        self.rounds_closed += 1;
        self.last_outcome = Some(outcome);

        info!(
            total = outcome.total,
            own_value = outcome.own_value,
            threshold = outcome.threshold,
            peers = outcome.peers,
            "election round closed"
        );
        match outcome.role {
            ChRole::Active => info!("I am the cluster head"),
            ChRole::Passive { relay_to: Some(to) } => {
                info!(relay_to = %to, "I am NOT the cluster head")
            }
            ChRole::Passive { relay_to: None } => {
                warn!("I am NOT the cluster head and no peer qualifies as relay")
            }
        }
        outcome
    }

    pub fn role(&self) -> ChRole {
        self.role
    }

    pub fn expected_peers(&self) -> u32 {
        self.expected_peers
    }

    pub fn own_value(&self) -> u32 {
        self.own_value
    }

    /// Round currently collecting values
    pub fn round(&self) -> Option<&ElectionRound> {
        self.round.as_ref()
    }

    pub fn rounds_closed(&self) -> u64 {
        self.rounds_closed
    }

    pub fn last_outcome(&self) -> Option<&RoundOutcome> {
        self.last_outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn peer(host: u16, value: u32) -> PeerValue {
        PeerValue {
            value,
            addr: NodeAddress::local(host),
        }
    }

    /// Engine that drew `own` and heard `peers` presence markers
    fn engine_with(own: u32, peers: u32) -> ElectionEngine {
        let mut engine = ElectionEngine::new();
        for host in 0..peers {
            engine.on_presence(NodeAddress::local(100 + host as u16));
        }
        engine.draw(&mut StdRng::seed_from_u64(1), own..=own);
        engine
    }

    #[test]
    fn test_decide_active() {
        let outcome = decide(700, &[peer(1, 300), peer(2, 500)]);
        assert_eq!(outcome.total, 1500);
        assert_eq!(outcome.threshold, 500);
        assert_eq!(outcome.role, ChRole::Active);
    }

    #[test]
    fn test_decide_passive_first_match_not_max() {
        // threshold = (400 + 900 + 600 + 100) / 4 = 500
        let outcome = decide(100, &[peer(1, 400), peer(2, 600), peer(3, 900)]);
        assert_eq!(outcome.threshold, 500);
        assert_eq!(
            outcome.role,
            ChRole::Passive {
                relay_to: Some(NodeAddress::local(2))
            }
        );
    }

    #[test]
    fn test_decide_tie_goes_to_arrival_order() {
        let outcome = decide(100, &[peer(7, 800), peer(3, 800)]);
        assert_eq!(outcome.role.relay_to(), Some(NodeAddress::local(7)));
    }

    #[test]
    fn test_decide_own_equal_threshold_is_active() {
        let outcome = decide(500, &[peer(1, 500)]);
        assert_eq!(outcome.threshold, 500);
        assert!(outcome.role.is_active());
    }

    #[test]
    fn test_decide_alone_is_active() {
        let outcome = decide(1, &[]);
        assert_eq!(outcome.threshold, 1);
        assert!(outcome.role.is_active());
    }

    #[test]
    fn test_initial_role_active() {
        let engine = ElectionEngine::new();
        assert!(engine.role().is_active());
        assert_eq!(engine.rounds_closed(), 0);
    }

    #[test]
    fn test_round_closes_at_expected_count() {
        let mut engine = engine_with(100, 2);
        assert!(engine.on_peer_value(NodeAddress::local(1), 900).is_none());
        assert_eq!(engine.round().map(|r| r.running_sum()), Some(900));

        let outcome = engine.on_peer_value(NodeAddress::local(2), 800).unwrap();
        assert_eq!(outcome.threshold, 600);
        assert_eq!(engine.role().relay_to(), Some(NodeAddress::local(1)));
        assert!(engine.round().is_none());
        assert_eq!(engine.rounds_closed(), 1);
    }

    #[test]
    fn test_late_value_opens_next_round() {
        let mut engine = engine_with(900, 1);
        engine.on_peer_value(NodeAddress::local(1), 100).unwrap();
        assert!(engine.role().is_active());

        // Peer count persists: a single value closes the next round too
        let outcome = engine.on_peer_value(NodeAddress::local(1), 1000).unwrap();
        assert_eq!(outcome.threshold, 950);
        assert_eq!(engine.role().relay_to(), Some(NodeAddress::local(1)));
        assert_eq!(engine.rounds_closed(), 2);
    }

    #[test]
    fn test_presence_during_collection_raises_target() {
        let mut engine = engine_with(500, 1);
        engine.on_presence(NodeAddress::local(2));
        assert!(engine.on_peer_value(NodeAddress::local(1), 400).is_none());
        assert!(engine.on_peer_value(NodeAddress::local(2), 400).is_some());
    }

    #[test]
    fn test_value_without_peers_dropped() {
        let mut engine = ElectionEngine::new();
        assert!(engine.on_peer_value(NodeAddress::local(1), 10).is_none());
        assert!(engine.round().is_none());
        assert_eq!(engine.rounds_closed(), 0);
    }

    #[test]
    fn test_draw_alone_closes_active() {
        let mut engine = ElectionEngine::new();
        let value = engine.draw(&mut StdRng::seed_from_u64(9), 1..=1000);
        assert!((1..=1000).contains(&value));
        assert_eq!(engine.rounds_closed(), 1);
        assert!(engine.role().is_active());
        assert_eq!(engine.last_outcome().map(|o| o.threshold), Some(value));
    }

    #[test]
    fn test_redraw_updates_live_round() {
        let mut engine = engine_with(10, 2);
        engine.on_peer_value(NodeAddress::local(1), 500);
        engine.draw(&mut StdRng::seed_from_u64(3), 999..=999);
        assert_eq!(engine.round().map(|r| r.own_value()), Some(999));

        let outcome = engine.on_peer_value(NodeAddress::local(2), 500).unwrap();
        assert_eq!(outcome.own_value, 999);
        assert!(outcome.role.is_active());
    }

    proptest! {
        #[test]
        fn prop_threshold_is_integer_mean(
            own in 1u32..=1000,
            values in proptest::collection::vec(1u32..=1000, 0..16),
        ) {
            let collected: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| peer(i as u16, *v))
                .collect();
            let outcome = decide(own, &collected);

            let sum: u64 = values.iter().map(|v| *v as u64).sum::<u64>() + own as u64;
            prop_assert_eq!(outcome.threshold as u64, sum / (values.len() as u64 + 1));
            prop_assert_eq!(outcome.role.is_active(), own >= outcome.threshold);
        }

        #[test]
        fn prop_relay_is_first_qualifier(
            own in 1u32..=1000,
            values in proptest::collection::vec(1u32..=1000, 1..16),
        ) {
            let collected: Vec<_> = values
                .iter()
                .enumerate()
                .map(|(i, v)| peer(i as u16, *v))
                .collect();
            let outcome = decide(own, &collected);

            if let ChRole::Passive { relay_to } = outcome.role {
                let first = collected.iter().position(|p| p.value >= outcome.threshold);
                // The mean never exceeds the maximum, so someone qualifies
                prop_assert!(first.is_some());
                prop_assert_eq!(relay_to, first.map(|i| collected[i].addr));
            }
        }
    }
}
