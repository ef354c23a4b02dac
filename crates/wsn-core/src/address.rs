//! Node addressing
//!
//! Addresses are opaque to the protocol: they are compared, hashed and used
//! as relay targets, but never interpreted.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Network address of a node (IPv6 in deployments, any IP in tests)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeAddress(pub IpAddr);

impl NodeAddress {
    /// Address under the `fd00::/64` prefix, handy for simulated nodes
    pub fn local(host: u16) -> Self {
        NodeAddress(IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, host)))
    }

    /// Socket address for this node on `port`
    #[inline]
    pub fn with_port(self, port: u16) -> SocketAddr {
        SocketAddr::new(self.0, port)
    }
}

impl From<IpAddr> for NodeAddress {
    fn from(ip: IpAddr) -> Self {
        NodeAddress(ip)
    }
}

impl From<Ipv6Addr> for NodeAddress {
    fn from(ip: Ipv6Addr) -> Self {
        NodeAddress(IpAddr::V6(ip))
    }
}

impl From<SocketAddr> for NodeAddress {
    fn from(addr: SocketAddr) -> Self {
        NodeAddress(addr.ip())
    }
}

impl FromStr for NodeAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<IpAddr>().map(NodeAddress)
    }
}

impl fmt::Debug for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
