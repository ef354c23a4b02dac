//! Protocol configuration
//!
//! Defaults carry the deployment constants; `fast()` presets shrink the
//! timers for demos and simulations.

use std::net::{IpAddr, Ipv6Addr};
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::{Channel, NodeAddress, WsnError, WsnResult, DISCOVERY_MARKER, PRESENCE_MARKER};

/// One well-known port per traffic class
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMap {
    /// Clients listen here for RSSI feedback
    pub client_feedback: u16,
    /// Cluster heads listen here for client reports
    pub ch_data: u16,
    /// The sink listens here
    pub sink: u16,
    /// Cluster heads listen here for relayed data
    pub ch_relay: u16,
    /// Clients listen here for CH announcements
    pub discovery: u16,
    /// Cluster heads listen here for election traffic
    pub peer_group: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        PortMap {
            client_feedback: 8765,
            ch_data: 6666,
            sink: 7777,
            ch_relay: 4444,
            discovery: 3001,
            peer_group: 3002,
        }
    }
}

impl PortMap {
    /// Port serving a channel
    pub fn port(&self, channel: Channel) -> u16 {
        match channel {
            Channel::ClientData => self.ch_data,
            Channel::Feedback => self.client_feedback,
            Channel::PeerRelay => self.ch_relay,
            Channel::Sink => self.sink,
            Channel::PeerGroup => self.peer_group,
            Channel::Discovery => self.discovery,
        }
    }

    pub fn validate(&self) -> WsnResult<()> {
        let mut ports: Vec<u16> = Channel::ALL.iter().map(|c| self.port(*c)).collect();
        ports.sort_unstable();
        ports.dedup();
        if ports.len() != Channel::ALL.len() {
            return Err(WsnError::InvalidConfig(
                "each traffic class needs its own port".into(),
            ));
        }
        Ok(())
    }
}

/// Multicast settings shared by both groups
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MulticastConfig {
    /// Join groups and send to them. Off for loopback-only setups.
    pub enabled: bool,
    pub group: Ipv6Addr,
    /// Interface index for joins, 0 lets the kernel pick
    pub interface: u32,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        MulticastConfig {
            enabled: true,
            group: Ipv6Addr::new(0xff1e, 0, 0, 0, 0, 0, 0x89, 0xabcd),
            interface: 0,
        }
    }
}

impl MulticastConfig {
    pub fn disabled() -> Self {
        MulticastConfig {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> WsnResult<()> {
        if self.enabled && !self.group.is_multicast() {
            return Err(WsnError::InvalidConfig(format!(
                "{} is not a multicast address",
                self.group
            )));
        }
        Ok(())
    }
}

/// Text markers of the protocol
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Markers {
    /// CH -> CH presence announcement
    pub presence: String,
    /// CH -> client discovery announcement
    pub discovery: String,
}

impl Default for Markers {
    fn default() -> Self {
        Markers {
            presence: PRESENCE_MARKER.to_string(),
            discovery: DISCOVERY_MARKER.to_string(),
        }
    }
}

impl Markers {
    pub fn validate(&self) -> WsnResult<()> {
        if self.presence.is_empty() || self.discovery.is_empty() {
            return Err(WsnError::InvalidConfig("markers must not be empty".into()));
        }
        if self.presence == self.discovery {
            return Err(WsnError::InvalidConfig(
                "presence and discovery markers must differ".into(),
            ));
        }
        for marker in [&self.presence, &self.discovery] {
            if marker.bytes().all(|b| b.is_ascii_digit()) {
                return Err(WsnError::InvalidConfig(format!(
                    "marker {marker:?} would read as an election value"
                )));
            }
        }
        Ok(())
    }
}

/// Election timing and value range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElectionConfig {
    /// Random values are drawn from this range
    pub value_min: u32,
    pub value_max: u32,
    /// First draw (also when the presence marker goes out)
    pub draw_first: Duration,
    pub draw_interval: Duration,
    /// First value broadcast, after the draw so peer counts settle
    pub broadcast_first: Duration,
    pub broadcast_interval: Duration,
    /// First CH announcement to clients
    pub discovery_first: Duration,
    pub discovery_interval: Duration,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        ElectionConfig {
            value_min: 1,
            value_max: 1000,
            draw_first: Duration::from_secs(60),
            draw_interval: Duration::from_secs(150),
            broadcast_first: Duration::from_secs(90),
            broadcast_interval: Duration::from_secs(150),
            discovery_first: Duration::from_secs(120),
            discovery_interval: Duration::from_secs(150),
        }
    }
}

impl ElectionConfig {
    /// Same phase layout, seconds instead of minutes
    pub fn fast() -> Self {
        ElectionConfig {
            draw_first: Duration::from_millis(400),
            draw_interval: Duration::from_secs(2),
            broadcast_first: Duration::from_millis(600),
            broadcast_interval: Duration::from_secs(2),
            discovery_first: Duration::from_millis(800),
            discovery_interval: Duration::from_secs(2),
            ..Default::default()
        }
    }

    pub fn value_range(&self) -> RangeInclusive<u32> {
        self.value_min..=self.value_max
    }

    pub fn validate(&self) -> WsnResult<()> {
        if self.value_min > self.value_max {
            return Err(WsnError::InvalidConfig(format!(
                "empty value range {}..={}",
                self.value_min, self.value_max
            )));
        }
        if self.broadcast_first <= self.draw_first {
            return Err(WsnError::InvalidConfig(
                "value broadcast must start after the first draw".into(),
            ));
        }
        if self.draw_interval.is_zero()
            || self.broadcast_interval.is_zero()
            || self.discovery_interval.is_zero()
        {
            return Err(WsnError::InvalidConfig("timer intervals must be non-zero".into()));
        }
        Ok(())
    }
}

/// Transmit power control bounds
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PowerConfig {
    pub min_level: u8,
    pub max_level: u8,
    pub initial_level: u8,
    /// At or above: link is better than needed, lower power
    pub high_threshold: i16,
    /// Below: link too weak, raise power
    pub low_threshold: i16,
    pub decrease_step: u8,
    pub increase_step: u8,
}

impl Default for PowerConfig {
    fn default() -> Self {
        PowerConfig {
            min_level: 2,
            max_level: 31,
            initial_level: 31,
            high_threshold: -65,
            low_threshold: -70,
            decrease_step: 2,
            increase_step: 1,
        }
    }
}

impl PowerConfig {
    pub fn validate(&self) -> WsnResult<()> {
        if self.min_level > self.max_level {
            return Err(WsnError::InvalidConfig(format!(
                "power bounds inverted: {} > {}",
                self.min_level, self.max_level
            )));
        }
        if !(self.min_level..=self.max_level).contains(&self.initial_level) {
            return Err(WsnError::InvalidConfig(format!(
                "initial power {} outside {}..={}",
                self.initial_level, self.min_level, self.max_level
            )));
        }
        if self.low_threshold > self.high_threshold {
            return Err(WsnError::InvalidConfig(format!(
                "RSSI thresholds inverted: low {} > high {}",
                self.low_threshold, self.high_threshold
            )));
        }
        if self.decrease_step == 0 || self.increase_step == 0 {
            return Err(WsnError::InvalidConfig("power steps must be non-zero".into()));
        }
        Ok(())
    }
}

/// Client report schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportConfig {
    /// Delay before the first report cycle, lets CHs announce themselves
    pub setup_delay: Duration,
    pub period: Duration,
    /// Fixed delay between the periodic trigger and the send
    pub backoff: Duration,
    /// Extra random delay on top of `backoff`
    pub backoff_jitter: Duration,
    pub payload: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            setup_delay: Duration::from_secs(150),
            period: Duration::from_secs(31),
            backoff: Duration::from_secs(2),
            backoff_jitter: Duration::ZERO,
            payload: "Hello world".to_string(),
        }
    }
}

impl ReportConfig {
    pub fn fast() -> Self {
        ReportConfig {
            setup_delay: Duration::from_millis(1500),
            period: Duration::from_millis(500),
            backoff: Duration::from_millis(50),
            backoff_jitter: Duration::from_millis(20),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> WsnResult<()> {
        if self.period.is_zero() {
            return Err(WsnError::InvalidConfig("report period must be non-zero".into()));
        }
        if self.payload.is_empty() || self.payload.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WsnError::InvalidConfig(format!(
                "report payload {:?} would not read as application data",
                self.payload
            )));
        }
        Ok(())
    }
}

/// Cluster head configuration
#[derive(Clone, Debug)]
pub struct ClusterHeadConfig {
    pub bind_addr: IpAddr,
    pub ports: PortMap,
    pub multicast: MulticastConfig,
    pub markers: Markers,
    pub election: ElectionConfig,
    /// Border router receiving the data of active cluster heads
    pub sink: NodeAddress,
}

impl Default for ClusterHeadConfig {
    fn default() -> Self {
        ClusterHeadConfig {
            bind_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            ports: PortMap::default(),
            multicast: MulticastConfig::default(),
            markers: Markers::default(),
            election: ElectionConfig::default(),
            sink: NodeAddress::from(Ipv6Addr::new(0xfd00, 0, 0, 0x5000, 0, 0, 0, 1)),
        }
    }
}

impl ClusterHeadConfig {
    pub fn fast() -> Self {
        ClusterHeadConfig {
            election: ElectionConfig::fast(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> WsnResult<()> {
        self.ports.validate()?;
        self.multicast.validate()?;
        self.markers.validate()?;
        self.election.validate()
    }
}

/// Sensor client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub bind_addr: IpAddr,
    pub ports: PortMap,
    pub multicast: MulticastConfig,
    pub markers: Markers,
    pub power: PowerConfig,
    pub report: ReportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            bind_addr: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            ports: PortMap::default(),
            multicast: MulticastConfig::default(),
            markers: Markers::default(),
            power: PowerConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn fast() -> Self {
        ClientConfig {
            report: ReportConfig::fast(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> WsnResult<()> {
        self.ports.validate()?;
        self.multicast.validate()?;
        self.markers.validate()?;
        self.power.validate()?;
        self.report.validate()?;
        if self.report.payload == self.markers.presence
            || self.report.payload == self.markers.discovery
        {
            return Err(WsnError::InvalidConfig(format!(
                "report payload {:?} collides with a protocol marker",
                self.report.payload
            )));
        }
        Ok(())
    }
}
