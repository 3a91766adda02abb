//! Collaborator contracts consumed by the consensus engine.
//!
//! The engine never performs I/O itself. Storage, transport, execution and
//! block catch-up are reached through these traits.

use crate::BlockCommittedEvent;
use hotstuff_types::{Address, Hash, HotstuffMessage, Transaction, ValidatorInfo};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════
// Persistence
// ═══════════════════════════════════════════════════════════════════════════

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("no data at height {0}")]
    HeightNotFound(u64),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Block and validator storage.
pub trait Persistence: Send + Sync {
    /// Open a read context at `height`. The context is released when dropped.
    fn new_read_context(&self, height: u64) -> Result<Box<dyn ReadContext>, PersistenceError>;
}

/// A scoped read view over persisted state.
pub trait ReadContext {
    fn get_all_validators(&self, height: u64) -> Result<Vec<ValidatorInfo>, PersistenceError>;

    fn get_block_hash(&self, height: u64) -> Result<Option<Hash>, PersistenceError>;

    /// Height of the highest persisted block, 0 when nothing is committed.
    fn get_maximum_block_height(&self) -> Result<u64, PersistenceError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Network
// ═══════════════════════════════════════════════════════════════════════════

/// Local dispatch errors from the network collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown peer {0}")]
    UnknownPeer(Address),

    #[error("transport closed")]
    Closed,

    #[error("encode error: {0}")]
    Encode(String),
}

/// Fire-and-forget message transport.
pub trait Network: Send + Sync {
    fn send(&self, to: &Address, message: HotstuffMessage) -> Result<(), NetworkError>;

    /// Deliver to every validator, the sender included.
    fn broadcast(&self, message: HotstuffMessage) -> Result<(), NetworkError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Utility (execution)
// ═══════════════════════════════════════════════════════════════════════════

/// Errors from the execution collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UtilityError {
    #[error("no proposal block set")]
    NoProposal,

    #[error("execution context already released")]
    Released,

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("commit failed: {0}")]
    Commit(String),
}

/// Transaction execution engine.
pub trait Utility: Send + Sync {
    /// Open an execution context for `height`.
    fn new_context(&self, height: u64) -> Result<Box<dyn ExecutionContext>, UtilityError>;
}

/// One attempt at executing the block for a height/round.
pub trait ExecutionContext: Send {
    /// Reap pending transactions up to `max_bytes`, apply them, and return the
    /// resulting state hash with the included transactions.
    fn create_and_apply_proposal_block(
        &mut self,
        proposer: &Address,
        max_bytes: u64,
    ) -> Result<(Hash, Vec<Transaction>), UtilityError>;

    /// Stage a block proposed by someone else.
    fn set_proposal_block(
        &mut self,
        state_hash: Hash,
        proposer: &Address,
        transactions: &[Transaction],
    ) -> Result<(), UtilityError>;

    /// Apply the staged block, returning the computed state hash.
    fn apply_block(&mut self) -> Result<Hash, UtilityError>;

    /// Persist the applied block together with its encoded commit QC.
    fn commit(&mut self, quorum_certificate: &[u8]) -> Result<(), UtilityError>;

    fn release(&mut self) -> Result<(), UtilityError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// State sync
// ═══════════════════════════════════════════════════════════════════════════

/// Block catch-up service.
pub trait StateSync: Send + Sync {
    /// Called after every successful commit.
    fn on_block_committed(&self, event: BlockCommittedEvent);

    /// A message from a future height was seen; the node is behind.
    fn on_unsynced(&self, local_height: u64, observed_height: u64);

    fn request_metadata(&self);

    fn request_block(&self, height: u64);
}

// ═══════════════════════════════════════════════════════════════════════════
// Timer
// ═══════════════════════════════════════════════════════════════════════════

/// Background round timer owned by the pacemaker.
///
/// At most one timer is live: arming cancels whatever was armed before. When
/// it expires the implementation hands the ticket back to the engine, which
/// ignores tickets that are no longer current.
pub trait RoundTimer: Send {
    fn arm(&mut self, ticket: crate::TimerTicket, timeout: std::time::Duration);

    fn cancel(&mut self);
}
