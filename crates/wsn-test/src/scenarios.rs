//! Multi-node scenarios
//!
//! End-to-end checks over the simulator: election convergence, CH
//! selection, power convergence and the report path to the sink.

use wsn_cluster::ChRole;
use wsn_core::NodeAddress;

use crate::simulator::NetworkSimulator;

/// Election state across all cluster heads
#[derive(Clone, Debug, Default)]
pub struct ElectionSummary {
    pub active: Vec<NodeAddress>,
    /// Passive heads and their relay targets
    pub passive: Vec<(NodeAddress, Option<NodeAddress>)>,
    /// Threshold of each head's latest round, `None` before the first
    pub thresholds: Vec<Option<u32>>,
}

impl ElectionSummary {
    /// Every head closed a round with the same threshold, at least one is
    /// active and every passive head relays to an active one
    pub fn is_converged(&self) -> bool {
        let Some(Some(first)) = self.thresholds.first() else {
            return false;
        };
        self.thresholds.iter().all(|t| *t == Some(*first))
            && !self.active.is_empty()
            && self
                .passive
                .iter()
                .all(|(_, to)| to.is_some_and(|to| self.active.contains(&to)))
    }
}

pub fn summarize_election(sim: &NetworkSimulator) -> ElectionSummary {
    let mut summary = ElectionSummary::default();
    for addr in sim.cluster_heads() {
        let Some(head) = sim.cluster_head(addr) else {
            continue;
        };
        match head.role() {
            ChRole::Active => summary.active.push(addr),
            ChRole::Passive { relay_to } => summary.passive.push((addr, relay_to)),
        }
        summary
            .thresholds
            .push(head.election().last_outcome().map(|o| o.threshold));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use proptest::prelude::*;
    use wsn_core::PowerConfig;

    use crate::chaos::ChaosConfig;
    use crate::simulator::ScenarioBuilder;

    #[test]
    fn test_election_converges() {
        let (mut sim, heads, _) = ScenarioBuilder::new()
            .with_cluster_heads(3)
            .with_seed(11)
            .build();

        sim.run_until(Duration::from_secs(2));

        for addr in &heads {
            let head = sim.cluster_head(*addr).unwrap();
            assert_eq!(head.election().expected_peers(), 2);
            assert_eq!(head.election().last_outcome().unwrap().peers, 2);
        }
        let summary = summarize_election(&sim);
        assert!(summary.is_converged(), "{summary:?}");
    }

    #[test]
    fn test_election_keeps_converging() {
        let (mut sim, heads, _) = ScenarioBuilder::new()
            .with_cluster_heads(4)
            .with_seed(5)
            .build();

        // Five draw cycles
        sim.run_until(Duration::from_secs(10));

        for addr in &heads {
            let head = sim.cluster_head(*addr).unwrap();
            assert_eq!(head.election().expected_peers(), 3);
            // Plus the peerless round of the very first draw
            assert_eq!(head.election().rounds_closed(), 6);
        }
        assert!(summarize_election(&sim).is_converged());
    }

    #[test]
    fn test_client_picks_strongest_head() {
        let (mut sim, heads, clients) = ScenarioBuilder::new()
            .with_cluster_heads(3)
            .with_clients(1)
            .build();
        sim.set_path_rssi(heads[0], clients[0], -85);
        sim.set_path_rssi(heads[1], clients[0], -62);
        sim.set_path_rssi(heads[2], clients[0], -77);

        sim.run_until(Duration::from_secs(1));

        assert_eq!(sim.client(clients[0]).unwrap().selected_ch(), Some(heads[1]));
    }

    #[test]
    fn test_power_converges_into_band() {
        let (mut sim, heads, clients) = ScenarioBuilder::new()
            .with_cluster_heads(1)
            .with_clients(1)
            .build();
        sim.set_path_rssi(heads[0], clients[0], -50);

        sim.run_until(Duration::from_secs(20));

        // -50 dBm at level 31, 1 dB per level: level 15 reads -66
        let client = sim.client(clients[0]).unwrap();
        assert_eq!(client.power_level(), 15);
        let history = sim.radio(clients[0]).unwrap().history();
        assert_eq!(history.first(), Some(&31));
        assert_eq!(history.last(), Some(&15));
    }

    #[test]
    fn test_weak_link_raises_power_to_max() {
        let config = wsn_core::ClientConfig {
            power: PowerConfig {
                initial_level: 20,
                ..Default::default()
            },
            ..wsn_core::ClientConfig::fast()
        };
        let (mut sim, heads, clients) = ScenarioBuilder::new()
            .with_cluster_heads(1)
            .with_clients(1)
            .with_client_config(config)
            .build();
        sim.set_path_rssi(heads[0], clients[0], -80);

        sim.run_until(Duration::from_secs(20));

        assert_eq!(sim.client(clients[0]).unwrap().power_level(), 31);
    }

    #[test]
    fn test_report_reaches_sink() {
        let (mut sim, heads, clients) = ScenarioBuilder::new()
            .with_cluster_heads(1)
            .with_clients(1)
            .build();

        sim.run_until(Duration::from_secs(3));

        let log = sim.sink_log();
        assert!(!log.is_empty());
        assert!(log.iter().all(|r| r.from == heads[0]));
        assert!(log.iter().all(|r| r.payload == b"Hello world".to_vec()));
        assert_eq!(
            sim.client(clients[0]).unwrap().reports().sent(),
            log.len() as u64
        );
    }

    #[test]
    fn test_passive_heads_relay_through_active() {
        let (mut sim, heads, clients) = ScenarioBuilder::new()
            .with_cluster_heads(3)
            .with_clients(3)
            .with_seed(21)
            .build();
        sim.set_default_rssi(-95);
        for (head, client) in heads.iter().zip(&clients) {
            sim.set_path_rssi(*head, *client, -60);
        }

        sim.run_until(Duration::from_secs(12));

        let relayed: u64 = heads
            .iter()
            .map(|h| sim.cluster_head(*h).unwrap().router().stats().relayed)
            .sum();
        assert!(relayed > 0);
        assert!(sim
            .sink_log()
            .iter()
            .all(|r| r.payload == b"Hello world".to_vec() && heads.contains(&r.from)));

        // Relayed data takes exactly one hop before the sink
        let to_sink: u64 = heads
            .iter()
            .map(|h| sim.cluster_head(*h).unwrap().router().stats().to_sink)
            .sum();
        let sent: u64 = clients
            .iter()
            .map(|c| sim.client(*c).unwrap().reports().sent())
            .sum();
        assert_eq!(to_sink, sent);
    }

    #[test]
    fn test_survives_lossy_links() {
        let (mut sim, _, clients) = ScenarioBuilder::new()
            .with_cluster_heads(3)
            .with_clients(4)
            .with_link(ChaosConfig::lossy())
            .with_seed(3)
            .build();

        sim.run_until(Duration::from_secs(60));

        for addr in &clients {
            let level = sim.client(*addr).unwrap().power_level();
            assert!((2..=31).contains(&level));
        }
        assert!(!sim.sink_log().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_first_round_converges(heads in 2usize..6, seed in any::<u64>()) {
            let (mut sim, _, _) = ScenarioBuilder::new()
                .with_cluster_heads(heads)
                .with_seed(seed)
                .build();
            sim.run_until(Duration::from_secs(2));
            prop_assert!(summarize_election(&sim).is_converged());
        }
    }
}
