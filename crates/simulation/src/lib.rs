//! Deterministic simulation of a HotStuff validator cluster.
//!
//! Every validator runs a real [`ConsensusEngine`](hotstuff_bft::ConsensusEngine)
//! wired to in-memory collaborators:
//!
//! - [`SimStorage`]: committed blocks and the validator set
//! - [`SimUtility`]: deterministic transaction execution
//! - [`SimNetworkPort`]: encodes messages into a shared outbox
//! - [`SimTimer`]: round timers fired explicitly by the test
//! - [`SimStateSync`]: records commits and catch-up requests
//!
//! [`SimulationRunner`] routes messages through a [`SimulatedNetwork`] with
//! partitions, packet loss and FIFO or seeded random delivery order. Given
//! the same seed, a run is reproducible.

mod network;
mod runner;
mod state_sync;
mod storage;
mod timer;
mod utility;

pub use network::{
    DeliveryOrder, DropReason, Envelope, NetworkConfig, Outbox, SimNetworkPort, SimulatedNetwork,
};
pub use runner::{SafetyViolation, SimNode, SimulationConfig, SimulationRunner, SimulationStats};
pub use state_sync::SimStateSync;
pub use storage::SimStorage;
pub use timer::SimTimer;
pub use utility::{sim_state_hash, SimUtility};

/// Index of a node within a simulation. Node `i` has `NodeId(i + 1)`.
pub type NodeIndex = u32;
