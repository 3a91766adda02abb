//! Canonical signable bytes.
//!
//! Signatures cover a domain tag followed by the consensus coordinates and
//! the block hash. Justification and signature fields are never part of the
//! signed bytes.

use crate::{Hash, HotstuffStep};

/// Domain tag for HotStuff step votes.
pub const DOMAIN_HOTSTUFF_VOTE: &[u8] = b"hotstuff/vote/v1";

/// Build the signing message for a vote on `(height, round, step, block)`.
///
/// Layout: `domain || height || round || step || has_block || block_hash`.
pub fn vote_message(height: u64, round: u64, step: HotstuffStep, block_hash: Option<Hash>) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_HOTSTUFF_VOTE.len() + 8 + 8 + 1 + 1 + 32);
    message.extend_from_slice(DOMAIN_HOTSTUFF_VOTE);
    message.extend_from_slice(&height.to_le_bytes());
    message.extend_from_slice(&round.to_le_bytes());
    message.push(step.as_u8());
    match block_hash {
        Some(hash) => {
            message.push(1);
            message.extend_from_slice(hash.as_bytes());
        }
        None => message.push(0),
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_message_separates_coordinates() {
        let hash = Some(Hash::from_bytes(b"block"));
        let base = vote_message(1, 0, HotstuffStep::Prepare, hash);
        assert_ne!(base, vote_message(1, 1, HotstuffStep::Prepare, hash));
        assert_ne!(base, vote_message(2, 0, HotstuffStep::Prepare, hash));
        assert_ne!(base, vote_message(1, 0, HotstuffStep::PreCommit, hash));
        assert_ne!(base, vote_message(1, 0, HotstuffStep::Prepare, None));
        assert!(base.starts_with(DOMAIN_HOTSTUFF_VOTE));
    }
}
