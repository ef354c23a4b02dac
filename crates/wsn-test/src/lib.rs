//! WSN Test Harness - Simulation and protocol validation
//!
//! This crate provides:
//! - Lossy radio links with seeded loss and latency
//! - A simulated radio latching per-datagram RSSI
//! - A virtual-time multi-node network simulator
//! - End-to-end scenarios

pub mod chaos;
pub mod radio;
pub mod scenarios;
pub mod simulator;

pub use chaos::*;
pub use radio::*;
pub use scenarios::*;
pub use simulator::*;
