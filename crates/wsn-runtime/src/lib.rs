//! WSN Runtime - Node orchestration and main loop
//!
//! Every node runs one task that waits on two sources:
//! 1. The inbox, fed by one receive loop per bound channel
//! 2. The earliest pending timer
//!
//! Whichever fires first becomes a `NodeEvent` for the node state machine,
//! and the returned actions are executed before waiting again. Handlers
//! never run concurrently.

pub mod node;
pub mod sink;
pub mod timers;

pub use node::*;
pub use sink::*;
pub use timers::*;
