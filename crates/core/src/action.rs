//! Action types emitted by the consensus engine.

use crate::BlockCommittedEvent;
use hotstuff_types::{Address, HotstuffMessage};

/// Effects the engine wants performed once its state lock is released.
///
/// Handlers run as straight-line code over the locked state and only record
/// what should happen; the engine dispatches actions to its collaborators
/// afterwards.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Broadcast a message to all validators, the sender included.
    Broadcast { message: HotstuffMessage },

    /// Send a message to one validator (replica votes go to the leader).
    Send {
        to: Address,
        message: HotstuffMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // State sync
    // ═══════════════════════════════════════════════════════════════════════
    /// A block was committed.
    BlockCommitted(BlockCommittedEvent),

    /// A message from a future height arrived.
    Unsynced {
        local_height: u64,
        observed_height: u64,
    },

    /// Ask peers for their sync metadata.
    RequestMetadata,

    /// Ask peers for a committed block.
    RequestBlock { height: u64 },
}

impl Action {
    /// Short name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::Send { .. } => "Send",
            Action::BlockCommitted(_) => "BlockCommitted",
            Action::Unsynced { .. } => "Unsynced",
            Action::RequestMetadata => "RequestMetadata",
            Action::RequestBlock { .. } => "RequestBlock",
        }
    }
}
