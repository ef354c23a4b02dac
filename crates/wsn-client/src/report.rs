//! Periodic report generation
//!
//! Each period arms a short backoff so clients sharing a schedule do not
//! transmit together; the report goes out when the backoff expires. A new
//! period supersedes a backoff that has not fired yet.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, info};

use wsn_core::{Action, Channel, NodeAddress, Outbound, ReportConfig, TimerId};

/// Report schedule of one client
#[derive(Clone, Debug)]
pub struct ReportGenerator {
    config: ReportConfig,
    sent: u64,
    suppressed: u64,
}

impl ReportGenerator {
    pub fn new(config: ReportConfig) -> Self {
        ReportGenerator {
            config,
            sent: 0,
            suppressed: 0,
        }
    }

    /// Arm the first period after the setup delay
    pub fn start(&self) -> Action {
        Action::arm(TimerId::ReportPeriod, self.config.setup_delay)
    }

    /// Period expired: schedule the next one and the backoff
    pub fn on_period<R: Rng>(&mut self, rng: &mut R) -> Vec<Action> {
        let jitter_ms = self.config.backoff_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };

        vec![
            Action::arm(TimerId::ReportPeriod, self.config.period),
            Action::arm(TimerId::ReportBackoff, self.config.backoff + jitter),
        ]
    }

    /// Backoff expired: send to the selected CH, or skip without one
    pub fn on_backoff(&mut self, ch: Option<NodeAddress>) -> Vec<Action> {
        let Some(ch) = ch else {
            debug!("no cluster head selected yet, report suppressed");
            self.suppressed += 1;
            return Vec::new();
        };

        info!(ch = %ch, data = %self.config.payload, "sending report");
        self.sent += 1;
        vec![Action::Send(Outbound::unicast(
            Channel::ClientData,
            ch,
            self.config.payload.as_bytes(),
        ))]
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use wsn_core::Destination;

    #[test]
    fn test_start_waits_for_setup() {
        let reports = ReportGenerator::new(ReportConfig::default());
        assert_eq!(
            reports.start(),
            Action::arm(TimerId::ReportPeriod, Duration::from_secs(150))
        );
    }

    #[test]
    fn test_period_arms_fixed_backoff() {
        let mut reports = ReportGenerator::new(ReportConfig::default());
        let actions = reports.on_period(&mut StdRng::seed_from_u64(1));
        assert_eq!(
            actions,
            vec![
                Action::arm(TimerId::ReportPeriod, Duration::from_secs(31)),
                Action::arm(TimerId::ReportBackoff, Duration::from_secs(2)),
            ]
        );
    }

    #[test]
    fn test_backoff_jitter_bounded() {
        let config = ReportConfig {
            backoff: Duration::from_millis(100),
            backoff_jitter: Duration::from_millis(50),
            ..Default::default()
        };
        let mut reports = ReportGenerator::new(config);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..100 {
            let actions = reports.on_period(&mut rng);
            match actions[1] {
                Action::Arm {
                    timer: TimerId::ReportBackoff,
                    after,
                } => {
                    assert!(after >= Duration::from_millis(100));
                    assert!(after <= Duration::from_millis(150));
                }
                ref other => panic!("unexpected action {other:?}"),
            }
        }
    }

    #[test]
    fn test_backoff_sends_to_selected_ch() {
        let mut reports = ReportGenerator::new(ReportConfig::default());
        let ch = NodeAddress::local(3);

        let actions = reports.on_backoff(Some(ch));
        let out = actions[0].as_send().unwrap();
        assert_eq!(out.channel, Channel::ClientData);
        assert_eq!(out.dest, Destination::Node(ch));
        assert_eq!(out.payload, b"Hello world".to_vec());
        assert_eq!(reports.sent(), 1);
    }

    #[test]
    fn test_backoff_without_ch_suppressed() {
        let mut reports = ReportGenerator::new(ReportConfig::default());
        assert!(reports.on_backoff(None).is_empty());
        assert_eq!(reports.suppressed(), 1);
        assert_eq!(reports.sent(), 0);
    }
}
