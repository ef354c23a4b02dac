//! Traffic channels and payload classification
//!
//! Datagrams are plain text and are classified purely by shape:
//! - Presence marker: a CH announcing itself to its peers
//! - Digits only: a CH's random election value
//! - Discovery marker: "I am a cluster head", for clients
//! - Short signed decimal: RSSI feedback to a client
//! - Anything else: application data

/// Default presence marker exchanged between cluster heads
pub const PRESENCE_MARKER: &str = "A";

/// Default discovery marker multicast to clients
pub const DISCOVERY_MARKER: &str = "CH";

/// Traffic class a datagram travels on.
/// Every class owns one well-known port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Channel {
    /// Client reports arriving at a cluster head
    ClientData = 0x00,
    /// RSSI feedback arriving at a client
    Feedback = 0x01,
    /// Application data relayed from a passive CH to an active one
    PeerRelay = 0x02,
    /// Uplink from an active CH to the sink
    Sink = 0x03,
    /// CH peer multicast group (presence markers and election values)
    PeerGroup = 0x04,
    /// Client discovery multicast group (CH announcements)
    Discovery = 0x05,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::ClientData,
        Channel::Feedback,
        Channel::PeerRelay,
        Channel::Sink,
        Channel::PeerGroup,
        Channel::Discovery,
    ];

    /// Whether traffic on this channel goes to a multicast group
    #[inline]
    pub fn is_multicast(self) -> bool {
        matches!(self, Channel::PeerGroup | Channel::Discovery)
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::ClientData => "client-data",
            Channel::Feedback => "feedback",
            Channel::PeerRelay => "peer-relay",
            Channel::Sink => "sink",
            Channel::PeerGroup => "peer-group",
            Channel::Discovery => "discovery",
        }
    }
}

/// What a cluster head makes of an inbound payload.
/// Rules apply in a fixed order: presence marker, digits only, application data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadClass<'a> {
    /// Exactly the presence marker
    Presence,
    /// Election value from a peer
    PeerValue(u32),
    /// Client application data, forwarded untouched
    AppData(&'a [u8]),
    /// Zero-length datagram, carries nothing
    Empty,
}

/// Classify a payload received by a cluster head
pub fn classify<'a>(payload: &'a [u8], presence_marker: &str) -> PayloadClass<'a> {
    if payload.is_empty() {
        return PayloadClass::Empty;
    }
    if payload == presence_marker.as_bytes() {
        return PayloadClass::Presence;
    }
    if is_digits_only(payload) {
        return PayloadClass::PeerValue(parse_value(payload));
    }
    PayloadClass::AppData(payload)
}

/// What a client makes of an inbound payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientInbound {
    /// A cluster head announced itself
    Announcement,
    /// RSSI feedback from the chosen cluster head
    Feedback(i16),
    /// Not meant for clients
    Ignored,
}

/// Classify a payload received by a client, by channel first
pub fn classify_client(channel: Channel, payload: &[u8], discovery_marker: &str) -> ClientInbound {
    match channel {
        Channel::Discovery if payload == discovery_marker.as_bytes() => ClientInbound::Announcement,
        Channel::Feedback => ClientInbound::Feedback(parse_rssi(payload)),
        _ => ClientInbound::Ignored,
    }
}

/// Non-empty and made of ASCII decimal digits only
#[inline]
pub fn is_digits_only(payload: &[u8]) -> bool {
    !payload.is_empty() && payload.iter().all(u8::is_ascii_digit)
}

/// Parse an election value. Out-of-range values read as 0.
pub fn parse_value(payload: &[u8]) -> u32 {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// Parse an RSSI feedback string leniently:
/// optional leading whitespace and sign, then digits up to the first
/// non-digit. No digits reads as 0; overflow saturates.
pub fn parse_rssi(payload: &[u8]) -> i16 {
    let mut rest = payload;
    while let [b, tail @ ..] = rest {
        if b.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }

    let negative = match rest {
        [b'-', tail @ ..] => {
            rest = tail;
            true
        }
        [b'+', tail @ ..] => {
            rest = tail;
            false
        }
        _ => false,
    };

    let mut value: i32 = 0;
    for b in rest.iter().take_while(|b| b.is_ascii_digit()) {
        value = (value * 10 + (b - b'0') as i32).min(i16::MAX as i32 + 1);
    }
    if negative {
        value = -value;
    }
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Encode an RSSI sample as feedback text
#[inline]
pub fn encode_rssi(rssi: i16) -> Vec<u8> {
    rssi.to_string().into_bytes()
}

/// Encode an election value as peer-group text
#[inline]
pub fn encode_value(value: u32) -> Vec<u8> {
    value.to_string().into_bytes()
}
