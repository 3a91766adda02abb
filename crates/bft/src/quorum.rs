//! Quorum certificate aggregation and verification.
//!
//! A certificate is a set of individual ed25519 partial signatures over the
//! same `(height, round, step, block)` bytes. It is valid when more than two
//! thirds of the validator set signed, counting each validator once.

use hotstuff_types::{
    Block, HotstuffMessage, HotstuffStep, PartialSignature, QuorumCertificate, ValidatorSet,
};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QcError {
    #[error("quorum certificate is missing")]
    Missing,

    #[error("quorum certificate has no block")]
    MissingBlock,

    #[error("quorum certificate has no signatures")]
    EmptySignatures,

    #[error("{valid} valid signatures from {validators} validators is not a quorum")]
    ThresholdNotMet { valid: usize, validators: usize },
}

/// Aggregate pooled votes for `(height, round, step, block)` into a QC.
///
/// Votes for another view or another block, malformed or unverifiable
/// signatures, unknown signers and repeat signers are skipped.
pub fn build_qc<'a>(
    height: u64,
    round: u64,
    step: HotstuffStep,
    block: &Block,
    votes: impl IntoIterator<Item = &'a HotstuffMessage>,
    validators: &ValidatorSet,
) -> Result<QuorumCertificate, QcError> {
    let block_hash = block.hash();
    let mut seen = HashSet::new();
    let mut threshold_signature: Vec<PartialSignature> = Vec::new();

    for vote in votes {
        if !vote.is_vote() || vote.height != height || vote.round != round || vote.step != step {
            continue;
        }
        if vote.block_hash() != Some(block_hash) {
            trace!(height, round, %step, "Skipping vote for a different block");
            continue;
        }
        let Some(sig) = vote.partial_signature() else {
            continue;
        };
        if !sig.is_well_formed() || seen.contains(&sig.signer) {
            continue;
        }
        let Some(validator) = validators.get(&sig.signer) else {
            debug!(signer = %sig.signer, "Skipping vote from unknown signer");
            continue;
        };
        if !validator.public_key.verify(&vote.signable_bytes(), &sig.signature) {
            debug!(signer = %sig.signer, "Skipping vote with invalid signature");
            continue;
        }
        seen.insert(sig.signer);
        threshold_signature.push(sig.clone());
    }

    if !validators.is_quorum(threshold_signature.len()) {
        return Err(QcError::ThresholdNotMet {
            valid: threshold_signature.len(),
            validators: validators.len(),
        });
    }

    Ok(QuorumCertificate {
        height,
        round,
        step,
        block: Some(block.clone()),
        threshold_signature,
    })
}

/// Verify a certificate against the validator set.
///
/// Returns the number of distinct valid signers on success.
pub fn validate_qc(
    qc: Option<&QuorumCertificate>,
    validators: &ValidatorSet,
) -> Result<usize, QcError> {
    let qc = qc.ok_or(QcError::Missing)?;
    if qc.block.is_none() {
        return Err(QcError::MissingBlock);
    }
    if qc.threshold_signature.is_empty() {
        return Err(QcError::EmptySignatures);
    }

    let message = qc.signable_bytes();
    let mut seen = HashSet::new();
    for sig in &qc.threshold_signature {
        if !sig.is_well_formed() || seen.contains(&sig.signer) {
            continue;
        }
        let Some(validator) = validators.get(&sig.signer) else {
            continue;
        };
        if validator.public_key.verify(&message, &sig.signature) {
            seen.insert(sig.signer);
        }
    }

    if !validators.is_quorum(seen.len()) {
        return Err(QcError::ThresholdNotMet {
            valid: seen.len(),
            validators: validators.len(),
        });
    }
    Ok(seen.len())
}
