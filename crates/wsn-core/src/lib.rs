//! WSN Core - Fundamental types shared by sensor clients and cluster heads
//!
//! This crate defines:
//! - Node addressing (NodeAddress)
//! - Traffic channels and payload classification
//! - Node events, actions and the `NodeBehavior` seam
//! - Link-quality and radio seams
//! - Protocol configuration and errors

pub mod address;
pub mod class;
pub mod config;
pub mod error;
pub mod event;
pub mod link;

pub use address::*;
pub use class::*;
pub use config::*;
pub use error::*;
pub use event::*;
pub use link::*;
