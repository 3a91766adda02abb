//! Message and proposal validation.

use crate::quorum::{self, QcError};
use hotstuff_types::{
    Address, Block, Hash, HotstuffMessage, HotstuffStep, QuorumCertificate, ValidatorSet,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message at step {step} carries no block")]
    MissingBlock { step: HotstuffStep },

    #[error("NewRound message carries a block")]
    UnexpectedBlock,

    #[error("block height {block} does not match message height {message}")]
    HeightMismatch { block: u64, message: u64 },

    #[error("block payload of {size} bytes exceeds {max} bytes")]
    BlockTooLarge { size: u64, max: u64 },

    #[error("vote carries no partial signature")]
    MissingPartialSignature,

    #[error("partial signature is malformed")]
    MalformedPartialSignature,

    #[error("signer {0} is not a validator")]
    UnknownSigner(Address),

    #[error("invalid signature from {0}")]
    InvalidSignature(Address),

    #[error("expected a Prepare proposal")]
    NotAProposal,

    #[error("block proposed by {proposer}, expected leader {leader}")]
    WrongProposer { proposer: Address, leader: Address },

    #[error("message carries no quorum certificate")]
    MissingQuorumCertificate,

    #[error("quorum certificate does not certify this message")]
    CertificateMismatch,

    #[error("locked node needs a justification for a new proposal")]
    LockedWithoutJustification,

    #[error("proposal conflicts with the locked block {locked:?}")]
    ConflictsWithLock { locked: Option<Hash> },

    #[error(transparent)]
    QuorumCertificate(#[from] QcError),
}

/// Structural checks on a block: height and payload size.
pub fn validate_block(block: &Block, height: u64, max_block_bytes: u64) -> Result<(), ValidationError> {
    if block.height() != height {
        return Err(ValidationError::HeightMismatch {
            block: block.height(),
            message: height,
        });
    }
    let size = block.transactions_size() as u64;
    if size > max_block_bytes {
        return Err(ValidationError::BlockTooLarge {
            size,
            max: max_block_bytes,
        });
    }
    Ok(())
}

/// Every step after NewRound must carry a well-formed block for the
/// message's height.
pub fn validate_block_basic(msg: &HotstuffMessage, max_block_bytes: u64) -> Result<(), ValidationError> {
    if msg.step == HotstuffStep::NewRound {
        if msg.block.is_some() {
            return Err(ValidationError::UnexpectedBlock);
        }
        return Ok(());
    }
    let block = msg
        .block
        .as_ref()
        .ok_or(ValidationError::MissingBlock { step: msg.step })?;
    validate_block(block, msg.height, max_block_bytes)
}

/// Votes must be signed by a known validator over the message's signable bytes.
pub fn validate_partial_signature(
    msg: &HotstuffMessage,
    validators: &ValidatorSet,
) -> Result<(), ValidationError> {
    if !msg.is_vote() || msg.step == HotstuffStep::NewRound {
        return Ok(());
    }
    let sig = msg
        .partial_signature()
        .ok_or(ValidationError::MissingPartialSignature)?;
    if !sig.is_well_formed() {
        return Err(ValidationError::MalformedPartialSignature);
    }
    let validator = validators
        .get(&sig.signer)
        .ok_or(ValidationError::UnknownSigner(sig.signer))?;
    if !validator.public_key.verify(&msg.signable_bytes(), &sig.signature) {
        return Err(ValidationError::InvalidSignature(sig.signer));
    }
    Ok(())
}

/// Validate a Prepare proposal, including the locking rule.
///
/// A node locked on a certificate only accepts a proposal whose justify QC
/// certifies the proposed block and either extends the locked block or was
/// formed in a later view than the lock.
pub fn validate_proposal(
    msg: &HotstuffMessage,
    leader: Option<Address>,
    locked_qc: Option<&QuorumCertificate>,
    validators: &ValidatorSet,
    max_block_bytes: u64,
) -> Result<(), ValidationError> {
    if !msg.is_propose() || msg.step != HotstuffStep::Prepare {
        return Err(ValidationError::NotAProposal);
    }
    let block = msg
        .block
        .as_ref()
        .ok_or(ValidationError::MissingBlock { step: msg.step })?;
    validate_block(block, msg.height, max_block_bytes)?;

    if let Some(leader) = leader {
        if block.proposer() != leader {
            return Err(ValidationError::WrongProposer {
                proposer: block.proposer(),
                leader,
            });
        }
    }

    let justify = msg.quorum_certificate();
    if let Some(qc) = justify {
        quorum::validate_qc(Some(qc), validators)?;
    }

    let Some(locked) = locked_qc else {
        return Ok(());
    };
    let justify = justify.ok_or(ValidationError::LockedWithoutJustification)?;
    let block_hash = block.hash();
    if justify.block_hash() != Some(block_hash) {
        return Err(ValidationError::CertificateMismatch);
    }
    if locked.block_hash() == Some(block_hash) || justify.is_later_than(locked) {
        return Ok(());
    }
    Err(ValidationError::ConflictsWithLock {
        locked: locked.block_hash(),
    })
}

/// Check the QC a PreCommit, Commit or Decide proposal carries.
///
/// It must be a valid certificate of the preceding step, for the same view,
/// over the proposed block.
pub fn validate_step_certificate<'a>(
    msg: &'a HotstuffMessage,
    validators: &ValidatorSet,
) -> Result<&'a QuorumCertificate, ValidationError> {
    if !msg.is_propose() {
        return Err(ValidationError::NotAProposal);
    }
    let qc = msg
        .quorum_certificate()
        .ok_or(ValidationError::MissingQuorumCertificate)?;
    quorum::validate_qc(Some(qc), validators)?;
    let block_hash = msg
        .block_hash()
        .ok_or(ValidationError::MissingBlock { step: msg.step })?;

    let matches = qc.height == msg.height
        && qc.round == msg.round
        && Some(qc.step) == msg.step.certified_step()
        && qc.block_hash() == Some(block_hash);
    if !matches {
        return Err(ValidationError::CertificateMismatch);
    }
    Ok(qc)
}
