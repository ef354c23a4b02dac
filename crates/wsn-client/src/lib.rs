//! WSN Client - Everything a sensor client runs
//!
//! This crate implements:
//! - Transmit power control from RSSI feedback
//! - Cluster head selection by best announcement RSSI
//! - Periodic report generation
//! - The `SensorClient` node state machine

pub mod client;
pub mod power;
pub mod report;
pub mod selector;

pub use client::*;
pub use power::*;
pub use report::*;
pub use selector::*;
