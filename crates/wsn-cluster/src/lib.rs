//! WSN Cluster - Everything a cluster head runs
//!
//! This crate implements:
//! - The round-based cluster head election
//! - The message router classifying inbound datagrams
//! - The `ClusterHead` node state machine tying both to the timers

pub mod election;
pub mod head;
pub mod router;

pub use election::*;
pub use head::*;
pub use router::*;
