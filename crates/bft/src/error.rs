//! Engine-level errors.

use crate::{LeaderElectionError, PacemakerError, QcError, ValidationError};
use hotstuff_core::{PersistenceError, UtilityError};
use hotstuff_mempool::MempoolError;
use hotstuff_types::{Address, CodecError, Hash, MessageError};
use thiserror::Error;

/// Failure to commit a decided block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommitError {
    #[error("execution context failed to commit height {height}: {source}")]
    Execution { height: u64, source: UtilityError },

    #[error("no execution context open for height {height}")]
    NoExecutionContext { height: u64 },
}

/// Failure to accept a block delivered by state sync.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("synced block at height {height} carries no commit certificate")]
    MissingQuorumCertificate { height: u64 },

    #[error("synced block certificate does not decode: {0}")]
    Decode(#[from] CodecError),

    #[error("synced block certificate is invalid: {0}")]
    QuorumCertificate(#[from] QcError),

    #[error("certificate does not commit the synced block at height {height}")]
    CertificateMismatch { height: u64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Pacemaker(#[from] PacemakerError),

    #[error(transparent)]
    LeaderElection(#[from] LeaderElectionError),

    #[error(transparent)]
    QuorumCertificate(#[from] QcError),

    #[error("invalid message: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Mempool(#[from] MempoolError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Utility(#[from] UtilityError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("applied state hash {actual:?} does not match the proposed {expected:?}")]
    StateHashMismatch { expected: Hash, actual: Hash },

    #[error("{0} is not in the validator set")]
    NotAValidator(Address),
}
