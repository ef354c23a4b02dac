//! Sensor client node
//!
//! Listens on two channels:
//! - Discovery: cluster head announcements, scored by the CH selector
//! - Feedback: RSSI readings from the cluster head, fed to power control
//!
//! and reports to the selected cluster head on its own schedule.

use rand::Rng;
use tracing::{debug, trace};

use wsn_core::{
    classify_client, Action, ClientConfig, ClientInbound, Datagram, LinkQualitySource,
    NodeAddress, NodeBehavior, NodeEvent, NodeKind, TimerId, TxPowerControl,
};

use crate::{ChSelector, PowerAdjustment, PowerController, ReportGenerator};

/// Sensor client state machine
pub struct SensorClient<L, P, R> {
    config: ClientConfig,
    power: PowerController,
    selector: ChSelector,
    reports: ReportGenerator,
    link_quality: L,
    radio: P,
    rng: R,
}

impl<L: LinkQualitySource, P: TxPowerControl, R: Rng> SensorClient<L, P, R> {
    pub fn new(config: ClientConfig, link_quality: L, radio: P, rng: R) -> Self {
        SensorClient {
            power: PowerController::new(config.power.clone()),
            selector: ChSelector::new(),
            reports: ReportGenerator::new(config.report.clone()),
            config,
            link_quality,
            radio,
            rng,
        }
    }

    fn on_datagram(&mut self, datagram: Datagram) {
        match classify_client(
            datagram.channel,
            &datagram.payload,
            &self.config.markers.discovery,
        ) {
            ClientInbound::Announcement => {
                let sample = self.link_quality.sample(datagram.from);
                self.selector.offer(sample);
            }
            ClientInbound::Feedback(rssi) => {
                self.apply_feedback(rssi);
            }
            ClientInbound::Ignored => {
                trace!(from = %datagram.from, channel = datagram.channel.name(), "ignoring datagram");
            }
        }
    }

    /// Apply one feedback value directly, as if it had arrived
    pub fn apply_feedback(&mut self, rssi: i16) -> PowerAdjustment {
        let adjustment = self.power.on_feedback(rssi);
        if let Some(level) = adjustment.new_level() {
            self.radio.set_tx_power(level);
        }
        adjustment
    }

    pub fn selected_ch(&self) -> Option<NodeAddress> {
        self.selector.best()
    }

    pub fn power_level(&self) -> u8 {
        self.power.level()
    }

    pub fn selector(&self) -> &ChSelector {
        &self.selector
    }

    pub fn reports(&self) -> &ReportGenerator {
        &self.reports
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn radio(&self) -> &P {
        &self.radio
    }
}

impl<L: LinkQualitySource, P: TxPowerControl, R: Rng> NodeBehavior for SensorClient<L, P, R> {
    fn kind(&self) -> NodeKind {
        NodeKind::Client
    }

    fn start(&mut self) -> Vec<Action> {
        debug!(level = self.power.level(), "applying initial tx power");
        self.radio.set_tx_power(self.power.level());
        vec![self.reports.start()]
    }

    fn on_event(&mut self, event: NodeEvent) -> Vec<Action> {
        match event {
            NodeEvent::Timer(TimerId::ReportPeriod) => self.reports.on_period(&mut self.rng),
            NodeEvent::Timer(TimerId::ReportBackoff) => {
                self.reports.on_backoff(self.selector.best())
            }
            NodeEvent::Timer(_) => Vec::new(),
            NodeEvent::Datagram(datagram) => {
                self.on_datagram(datagram);
                Vec::new()
            }
        }
    }
}
