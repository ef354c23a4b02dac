//! WSN Transport Layer - UDP sockets per traffic class
//!
//! This crate provides:
//! - UDP transport bound to a well-known port
//! - IPv6 multicast group membership
//! - Background receive loops feeding one node inbox

pub mod udp;

pub use udp::*;
