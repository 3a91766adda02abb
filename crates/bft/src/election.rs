//! Leader election.

use hotstuff_types::{Hash, NodeId, ValidatorSet};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LeaderElectionError {
    #[error("no validators at height {height}")]
    NoValidators { height: u64 },
}

/// Deterministic mapping from `(validators, height, round)` to a leader.
///
/// Every honest node computes the same leader for the same view.
pub trait LeaderElection: Send + Sync {
    fn elect_next_leader(
        &self,
        validators: &ValidatorSet,
        height: u64,
        round: u64,
    ) -> Result<NodeId, LeaderElectionError>;
}

/// Rotate through the address-sorted validators: `(height + round - 1) mod n`.
///
/// Height 1, round 0 is led by `NodeId(1)`; every interrupted round moves the
/// leadership one position further.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl LeaderElection for RoundRobin {
    fn elect_next_leader(
        &self,
        validators: &ValidatorSet,
        height: u64,
        round: u64,
    ) -> Result<NodeId, LeaderElectionError> {
        let n = validators.len() as u64;
        if n == 0 {
            return Err(LeaderElectionError::NoValidators { height });
        }
        let index = (height % n + round % n + n - 1) % n;
        Ok(NodeId::from_index(index as usize))
    }
}

/// Pick a leader with probability proportional to voting power.
///
/// The draw is seeded by a hash of the view, so it is deterministic across
/// nodes. Falls back to [`RoundRobin`] when the set carries no power.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakeWeighted;

impl LeaderElection for StakeWeighted {
    fn elect_next_leader(
        &self,
        validators: &ValidatorSet,
        height: u64,
        round: u64,
    ) -> Result<NodeId, LeaderElectionError> {
        if validators.is_empty() {
            return Err(LeaderElectionError::NoValidators { height });
        }
        let total = validators.total_voting_power();
        if total == 0 {
            return RoundRobin.elect_next_leader(validators, height, round);
        }

        let seed = Hash::from_parts(&[
            b"hotstuff/leader",
            &height.to_le_bytes(),
            &round.to_le_bytes(),
        ]);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&seed.as_bytes()[..8]);
        let mut target = u64::from_le_bytes(prefix) % total;

        for (i, validator) in validators.iter().enumerate() {
            if target < validator.voting_power {
                return Ok(NodeId::from_index(i));
            }
            target -= validator.voting_power;
        }
        // Unreachable while target < total.
        RoundRobin.elect_next_leader(validators, height, round)
    }
}
