//! Error types for the WSN overlay
//!
//! Only node startup can fail: once a node runs, send and receive failures
//! are logged and the datagram is dropped.

use std::net::Ipv6Addr;

use thiserror::Error;

/// Core WSN errors
#[derive(Error, Debug)]
pub enum WsnError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Cannot bind port {port}: {reason}")]
    BindFailed { port: u16, reason: String },

    #[error("Cannot join multicast group {group}: {reason}")]
    MulticastJoinFailed { group: Ipv6Addr, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Event channel closed")]
    ChannelClosed,
}

/// Result type for WSN operations
pub type WsnResult<T> = Result<T, WsnError>;
