//! Link-quality and radio seams
//!
//! The radio driver is external: the core only asks it for the RSSI of the
//! datagram it just received, and tells it which transmit power to use.

use std::collections::HashMap;

use crate::NodeAddress;

/// RSSI below any physically plausible reading
pub const RSSI_FLOOR: i16 = -200;

/// Signal strength of one received datagram
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalSample {
    pub source: NodeAddress,
    /// dBm
    pub rssi: i16,
}

/// Yields the RSSI of the most recent datagram from `source`
pub trait LinkQualitySource {
    fn sample(&mut self, source: NodeAddress) -> SignalSample;
}

/// Applies transmit power levels to the radio
pub trait TxPowerControl {
    fn set_tx_power(&mut self, level: u8);
}

/// Link quality from a fixed table, for hosts without a radio readout
#[derive(Clone, Debug)]
pub struct StaticLinkQuality {
    default_rssi: i16,
    table: HashMap<NodeAddress, i16>,
}

impl StaticLinkQuality {
    pub fn new(default_rssi: i16) -> Self {
        StaticLinkQuality {
            default_rssi,
            table: HashMap::new(),
        }
    }

    /// Pin the reading for one address
    pub fn with_entry(mut self, source: NodeAddress, rssi: i16) -> Self {
        self.table.insert(source, rssi);
        self
    }

    pub fn set(&mut self, source: NodeAddress, rssi: i16) {
        self.table.insert(source, rssi);
    }
}

impl LinkQualitySource for StaticLinkQuality {
    fn sample(&mut self, source: NodeAddress) -> SignalSample {
        let rssi = self
            .table
            .get(&source)
            .copied()
            .unwrap_or(self.default_rssi);
        tracing::debug!(%source, rssi, "RSSI of last packet");
        SignalSample { source, rssi }
    }
}

/// Radio stand-in that keeps the applied levels
#[derive(Clone, Debug, Default)]
pub struct RecordingRadio {
    applied: Vec<u8>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied level
    pub fn level(&self) -> Option<u8> {
        self.applied.last().copied()
    }

    /// Every level applied so far, oldest first
    pub fn history(&self) -> &[u8] {
        &self.applied
    }
}

impl TxPowerControl for RecordingRadio {
    fn set_tx_power(&mut self, level: u8) {
        tracing::info!(level, "radio tx power set");
        self.applied.push(level);
    }
}
