//! In-memory simulation harness for Hare.
//!
//! Provides the pieces the consensus core leaves to its environment, wired
//! for deterministic multi-process tests:
//!
//! - [`SimNetwork`]: an in-memory gossip cloud with per-node silencing,
//!   raw payload injection for Byzantine actors, and a tap for observing
//!   delivered traffic
//! - [`SimOracle`]: a deterministic, agreement-preserving role oracle
//! - [`HareCluster`]: spins up N processes over a shared network and
//!   oracle, runs the broker task per node, and collects termination
//!   outputs
//!
//! Tests drive rounds through tokio's paused clock, so wall time never
//! enters the picture.

mod cluster;
mod network;
mod oracle;

pub use cluster::HareCluster;
pub use network::{NodeHandle, SimNetwork};
pub use oracle::SimOracle;
