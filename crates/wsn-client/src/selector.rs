//! Cluster head selection
//!
//! Passive only: every discovery announcement is scored by its RSSI and
//! the best one seen so far wins. The best RSSI never decays, so a client
//! only switches to a strictly stronger cluster head.

use tracing::{debug, info};

use wsn_core::{NodeAddress, SignalSample, RSSI_FLOOR};

/// Best cluster head seen by one client
#[derive(Clone, Debug)]
pub struct ChSelector {
    best_addr: Option<NodeAddress>,
    best_rssi: i16,
}

impl Default for ChSelector {
    fn default() -> Self {
        ChSelector {
            best_addr: None,
            best_rssi: RSSI_FLOOR,
        }
    }
}

impl ChSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider an announcement. Returns true when it became the new best.
    pub fn offer(&mut self, sample: SignalSample) -> bool {
        if sample.rssi > self.best_rssi {
            self.best_rssi = sample.rssi;
            self.best_addr = Some(sample.source);
            info!(ch = %sample.source, rssi = sample.rssi, "new CH selected");
            true
        } else {
            debug!(ch = %sample.source, rssi = sample.rssi, best_rssi = self.best_rssi, "best CH already set");
            false
        }
    }

    pub fn best(&self) -> Option<NodeAddress> {
        self.best_addr
    }

    pub fn best_rssi(&self) -> i16 {
        self.best_rssi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(host: u16, rssi: i16) -> SignalSample {
        SignalSample {
            source: NodeAddress::local(host),
            rssi,
        }
    }

    #[test]
    fn test_starts_empty() {
        let selector = ChSelector::new();
        assert_eq!(selector.best(), None);
        assert_eq!(selector.best_rssi(), RSSI_FLOOR);
    }

    #[test]
    fn test_first_announcement_wins() {
        let mut selector = ChSelector::new();
        assert!(selector.offer(sample(1, -127)));
        assert_eq!(selector.best(), Some(NodeAddress::local(1)));
    }

    #[test]
    fn test_best_rssi_is_monotonic() {
        let mut selector = ChSelector::new();
        let changes: Vec<bool> = [sample(1, -90), sample(2, -70), sample(3, -85)]
            .into_iter()
            .map(|s| selector.offer(s))
            .collect();

        assert_eq!(changes, vec![true, true, false]);
        assert_eq!(selector.best(), Some(NodeAddress::local(2)));
        assert_eq!(selector.best_rssi(), -70);
    }

    #[test]
    fn test_equal_rssi_keeps_current() {
        let mut selector = ChSelector::new();
        selector.offer(sample(1, -70));
        assert!(!selector.offer(sample(2, -70)));
        assert_eq!(selector.best(), Some(NodeAddress::local(1)));
    }

    #[test]
    fn test_current_ch_fading_does_not_reset() {
        let mut selector = ChSelector::new();
        selector.offer(sample(1, -60));
        selector.offer(sample(1, -95));
        assert_eq!(selector.best_rssi(), -60);
        assert_eq!(selector.best(), Some(NodeAddress::local(1)));
    }
}
