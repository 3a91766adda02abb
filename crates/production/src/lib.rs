//! Production runtime for a HotStuff validator.
//!
//! Wraps the synchronous [`ConsensusEngine`](hotstuff_bft::ConsensusEngine)
//! with async I/O:
//!
//! - [`NodeRunner`]: a tokio task that owns the event loop
//! - [`TokioRoundTimer`]: the pacemaker's round timer as a spawned sleep
//! - [`LocalNetwork`]: in-process transport for running several nodes in
//!   one process
//! - [`NodeConfig`]: TOML configuration file
//! - [`init_telemetry`]: `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use hotstuff_production::{init_telemetry, NodeConfig};
//!
//! let config = NodeConfig::load("node.toml").unwrap();
//! init_telemetry(&config.telemetry).unwrap();
//! ```

mod config;
mod network;
mod runner;
pub mod telemetry;
mod timers;

pub use config::{ConfigError, NodeConfig, NodeSection, DEFAULT_CHANNEL_CAPACITY};
pub use network::{LocalHub, LocalNetwork};
pub use runner::{NodeHandle, NodeRunner, RunnerError, ShutdownHandle};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
pub use timers::TokioRoundTimer;
