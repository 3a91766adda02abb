//! Consensus configuration.

use hotstuff_mempool::{MempoolConfig, DEFAULT_MAX_BYTES_PER_STEP};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum transaction payload per block (90 KB).
pub const DEFAULT_MAX_BLOCK_BYTES: u64 = 90_000;

/// Allowance for everything in a vote besides the block's transactions.
pub const VOTE_OVERHEAD_BYTES: usize = 4 * 1024;

/// Default round timeout.
pub const DEFAULT_ROUND_TIMEOUT_MS: u64 = 5_000;

/// Pacemaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacemakerConfig {
    /// Round timeout in milliseconds. An expired timer interrupts the round.
    pub timeout_ms: u64,

    /// Start in manual mode: NewRound broadcasts are held until a forced
    /// view change.
    pub manual: bool,
}

impl Default for PacemakerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ROUND_TIMEOUT_MS,
            manual: false,
        }
    }
}

impl PacemakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the consensus engine.
///
/// # Example
///
/// ```
/// use hotstuff_bft::ConsensusConfig;
/// use std::time::Duration;
///
/// let config = ConsensusConfig::default()
///     .with_round_timeout(Duration::from_secs(2))
///     .with_max_block_bytes(64 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Byte budget of each per-step message queue.
    ///
    /// Default: 500 KiB
    pub max_mempool_bytes_per_step: usize,

    /// Maximum transaction payload of a proposed block.
    ///
    /// Default: 90 KB
    pub max_block_bytes: u64,

    pub pacemaker: PacemakerConfig,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_mempool_bytes_per_step: DEFAULT_MAX_BYTES_PER_STEP,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            pacemaker: PacemakerConfig::default(),
        }
    }
}

impl ConsensusConfig {
    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.pacemaker.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_manual_mode(mut self, manual: bool) -> Self {
        self.pacemaker.manual = manual;
        self
    }

    pub fn with_max_block_bytes(mut self, bytes: u64) -> Self {
        self.max_block_bytes = bytes;
        self
    }

    pub fn with_max_mempool_bytes_per_step(mut self, bytes: usize) -> Self {
        self.max_mempool_bytes_per_step = bytes;
        self
    }

    /// Deterministic harness settings: manual view changes, short timeout.
    pub fn for_testing() -> Self {
        Self {
            max_mempool_bytes_per_step: DEFAULT_MAX_BYTES_PER_STEP,
            max_block_bytes: DEFAULT_MAX_BLOCK_BYTES,
            pacemaker: PacemakerConfig {
                timeout_ms: 100,
                manual: true,
            },
        }
    }

    /// Per-step budget needed to hold `quorum` votes on a maximum-size block.
    ///
    /// Votes carry the whole block, so a smaller budget evicts votes before a
    /// certificate can form.
    pub fn required_bytes_per_step(&self, quorum: usize) -> usize {
        let per_vote = usize::try_from(self.max_block_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(VOTE_OVERHEAD_BYTES);
        quorum.saturating_mul(per_vote)
    }

    pub fn mempool(&self) -> MempoolConfig {
        MempoolConfig {
            max_bytes_per_step: self.max_mempool_bytes_per_step,
        }
    }
}
