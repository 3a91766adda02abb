//! Consensus message mempool.
//!
//! The leader aggregates votes here before forming quorum certificates:
//!
//! - [`MessageFifo`]: a byte-budgeted sliding-window FIFO for one step
//! - [`MessagePool`]: five independent FIFOs, one per HotStuff step
//!
//! Access is serialized by the consensus engine's lock, so plain collections
//! are used throughout.

mod fifo;
mod pool;

pub use fifo::MessageFifo;
pub use pool::MessagePool;

use hotstuff_types::CodecError;
use thiserror::Error;

/// Default per-step byte budget (500 KiB).
pub const DEFAULT_MAX_BYTES_PER_STEP: usize = 500 * 1024;

/// Mempool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MempoolConfig {
    /// Byte budget for each step's queue.
    pub max_bytes_per_step: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_bytes_per_step: DEFAULT_MAX_BYTES_PER_STEP,
        }
    }
}

/// Mempool errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("message of {size} bytes exceeds the step budget of {capacity} bytes")]
    Full { size: usize, capacity: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}
