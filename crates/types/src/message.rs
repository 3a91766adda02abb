//! HotStuff consensus messages.

use crate::{
    codec, signing, Block, Hash, KeyPair, PartialSignature, QuorumCertificate,
};
use sbor::prelude::*;
use std::fmt;
use thiserror::Error;

/// The five sub-phases of a round, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
pub enum HotstuffStep {
    NewRound,
    Prepare,
    PreCommit,
    Commit,
    Decide,
}

impl HotstuffStep {
    pub const ALL: [HotstuffStep; 5] = [
        HotstuffStep::NewRound,
        HotstuffStep::Prepare,
        HotstuffStep::PreCommit,
        HotstuffStep::Commit,
        HotstuffStep::Decide,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            HotstuffStep::NewRound => 0,
            HotstuffStep::Prepare => 1,
            HotstuffStep::PreCommit => 2,
            HotstuffStep::Commit => 3,
            HotstuffStep::Decide => 4,
        }
    }

    pub fn index(self) -> usize {
        self.as_u8() as usize
    }

    /// The step whose certificate a proposal at this step carries.
    ///
    /// A PreCommit proposal carries the Prepare QC, Commit carries PreCommit,
    /// Decide carries Commit. NewRound and Prepare have no fixed predecessor.
    pub fn certified_step(self) -> Option<HotstuffStep> {
        match self {
            HotstuffStep::PreCommit => Some(HotstuffStep::Prepare),
            HotstuffStep::Commit => Some(HotstuffStep::PreCommit),
            HotstuffStep::Decide => Some(HotstuffStep::Commit),
            HotstuffStep::NewRound | HotstuffStep::Prepare => None,
        }
    }
}

impl fmt::Display for HotstuffStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HotstuffStep::NewRound => "NEWROUND",
            HotstuffStep::Prepare => "PREPARE",
            HotstuffStep::PreCommit => "PRECOMMIT",
            HotstuffStep::Commit => "COMMIT",
            HotstuffStep::Decide => "DECIDE",
        };
        f.write_str(name)
    }
}

/// Leader proposals and replica votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub enum HotstuffMessageType {
    Propose,
    Vote,
}

/// What backs a message: a certificate from the leader, or a replica's signature.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum Justification {
    QuorumCertificate(QuorumCertificate),
    PartialSignature(PartialSignature),
}

/// Errors constructing a message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("{message_type:?} at step {step} requires a block")]
    MissingBlock {
        message_type: HotstuffMessageType,
        step: HotstuffStep,
    },

    #[error("proposal at step {step} requires a quorum certificate")]
    MissingQuorumCertificate { step: HotstuffStep },

    #[error("votes at step {0} are not allowed")]
    UnexpectedVoteStep(HotstuffStep),
}

/// A consensus message.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct HotstuffMessage {
    pub message_type: HotstuffMessageType,
    pub height: u64,
    pub round: u64,
    pub step: HotstuffStep,
    pub block: Option<Block>,
    pub justification: Option<Justification>,
}

impl HotstuffMessage {
    /// Build a leader proposal.
    ///
    /// Every step after Prepare must carry a certificate; every step after
    /// NewRound must carry a block.
    pub fn propose(
        height: u64,
        round: u64,
        step: HotstuffStep,
        block: Option<Block>,
        quorum_certificate: Option<QuorumCertificate>,
    ) -> Result<Self, MessageError> {
        if step != HotstuffStep::NewRound && block.is_none() {
            return Err(MessageError::MissingBlock {
                message_type: HotstuffMessageType::Propose,
                step,
            });
        }
        if step.certified_step().is_some() && quorum_certificate.is_none() {
            return Err(MessageError::MissingQuorumCertificate { step });
        }
        Ok(Self {
            message_type: HotstuffMessageType::Propose,
            height,
            round,
            step,
            block,
            justification: quorum_certificate.map(Justification::QuorumCertificate),
        })
    }

    /// Build the NewRound message a node broadcasts when it enters a view.
    pub fn new_round(height: u64, round: u64, high_qc: Option<QuorumCertificate>) -> Self {
        Self {
            message_type: HotstuffMessageType::Propose,
            height,
            round,
            step: HotstuffStep::NewRound,
            block: None,
            justification: high_qc.map(Justification::QuorumCertificate),
        }
    }

    /// Build and sign a replica vote for `block`.
    pub fn vote(
        height: u64,
        round: u64,
        step: HotstuffStep,
        block: &Block,
        signing_key: &KeyPair,
    ) -> Result<Self, MessageError> {
        if step == HotstuffStep::NewRound {
            return Err(MessageError::UnexpectedVoteStep(step));
        }
        let bytes = signing::vote_message(height, round, step, Some(block.hash()));
        let partial_signature = PartialSignature {
            signer: signing_key.address(),
            signature: signing_key.sign(&bytes),
        };
        Ok(Self {
            message_type: HotstuffMessageType::Vote,
            height,
            round,
            step,
            block: Some(block.clone()),
            justification: Some(Justification::PartialSignature(partial_signature)),
        })
    }

    pub fn is_propose(&self) -> bool {
        self.message_type == HotstuffMessageType::Propose
    }

    pub fn is_vote(&self) -> bool {
        self.message_type == HotstuffMessageType::Vote
    }

    pub fn quorum_certificate(&self) -> Option<&QuorumCertificate> {
        match &self.justification {
            Some(Justification::QuorumCertificate(qc)) => Some(qc),
            _ => None,
        }
    }

    pub fn partial_signature(&self) -> Option<&PartialSignature> {
        match &self.justification {
            Some(Justification::PartialSignature(sig)) => Some(sig),
            _ => None,
        }
    }

    pub fn block_hash(&self) -> Option<Hash> {
        self.block.as_ref().map(Block::hash)
    }

    /// The bytes a partial signature on this message covers.
    pub fn signable_bytes(&self) -> Vec<u8> {
        signing::vote_message(self.height, self.round, self.step, self.block_hash())
    }

    /// Hash of the full encoded message. Retransmissions hash identically.
    pub fn content_hash(&self) -> Result<Hash, codec::CodecError> {
        Ok(Hash::from_bytes(&codec::encode_message(self)?))
    }

    /// Size of the encoded message in bytes.
    pub fn encoded_size(&self) -> Result<usize, codec::CodecError> {
        Ok(codec::encode_message(self)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_block, test_key_pair};

    #[test]
    fn test_step_ordering() {
        assert!(HotstuffStep::NewRound < HotstuffStep::Prepare);
        assert!(HotstuffStep::Commit < HotstuffStep::Decide);
        for (i, step) in HotstuffStep::ALL.iter().enumerate() {
            assert_eq!(step.index(), i);
        }
    }

    #[test]
    fn test_propose_requires_block_and_qc() {
        assert_eq!(
            HotstuffMessage::propose(1, 0, HotstuffStep::Prepare, None, None),
            Err(MessageError::MissingBlock {
                message_type: HotstuffMessageType::Propose,
                step: HotstuffStep::Prepare
            })
        );
        let block = test_block(1, &test_key_pair(1));
        assert_eq!(
            HotstuffMessage::propose(1, 0, HotstuffStep::Commit, Some(block.clone()), None),
            Err(MessageError::MissingQuorumCertificate {
                step: HotstuffStep::Commit
            })
        );
        let prepare = HotstuffMessage::propose(1, 0, HotstuffStep::Prepare, Some(block), None)
            .expect("prepare proposal without QC is allowed");
        assert!(prepare.is_propose());
        assert!(prepare.partial_signature().is_none());
    }

    #[test]
    fn test_vote_carries_verifiable_signature() {
        let key = test_key_pair(2);
        let block = test_block(1, &key);
        let vote = HotstuffMessage::vote(1, 0, HotstuffStep::Prepare, &block, &key).unwrap();

        let sig = vote.partial_signature().expect("vote has a partial signature");
        assert_eq!(sig.signer, key.address());
        assert!(key.public_key().verify(&vote.signable_bytes(), &sig.signature));
        assert!(vote.quorum_certificate().is_none());

        assert_eq!(
            HotstuffMessage::vote(1, 0, HotstuffStep::NewRound, &block, &key),
            Err(MessageError::UnexpectedVoteStep(HotstuffStep::NewRound))
        );
    }

    #[test]
    fn test_content_hash_identifies_retransmissions() {
        let key = test_key_pair(3);
        let block = test_block(1, &key);
        let a = HotstuffMessage::vote(1, 0, HotstuffStep::Prepare, &block, &key).unwrap();
        let b = a.clone();
        let c = HotstuffMessage::vote(1, 1, HotstuffStep::Prepare, &block, &key).unwrap();
        assert_eq!(a.content_hash().unwrap(), b.content_hash().unwrap());
        assert_ne!(a.content_hash().unwrap(), c.content_hash().unwrap());
    }
}
