//! Quorum certificates and the partial signatures they aggregate.

use crate::{signing, Address, Block, Hash, HotstuffStep};
use sbor::prelude::*;

/// One validator's signature over a step's signable bytes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct PartialSignature {
    pub signer: Address,
    pub signature: Vec<u8>,
}

impl PartialSignature {
    /// Whether both the signer and signature bytes are present.
    pub fn is_well_formed(&self) -> bool {
        !self.signature.is_empty() && self.signer.as_bytes().iter().any(|b| *b != 0)
    }
}

/// Proof that more than two thirds of the validators signed
/// `(height, round, step, block)`.
///
/// The threshold signature is a set of individual partial signatures over
/// identical signable bytes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct QuorumCertificate {
    pub height: u64,
    pub round: u64,
    pub step: HotstuffStep,
    pub block: Option<Block>,
    pub threshold_signature: Vec<PartialSignature>,
}

impl QuorumCertificate {
    pub fn block_hash(&self) -> Option<Hash> {
        self.block.as_ref().map(Block::hash)
    }

    /// The bytes every partial signature in this certificate signs.
    pub fn signable_bytes(&self) -> Vec<u8> {
        signing::vote_message(self.height, self.round, self.step, self.block_hash())
    }

    /// Whether this certificate was formed after `other`: at a higher height,
    /// or at the same height in a later round.
    pub fn is_later_than(&self, other: &QuorumCertificate) -> bool {
        self.height > other.height || (self.height == other.height && self.round > other.round)
    }

    pub fn signer_count(&self) -> usize {
        self.threshold_signature.len()
    }
}
