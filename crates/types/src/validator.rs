//! Validator set and the address ↔ NodeId mapping.

use crate::{Address, NodeId, PublicKey};
use sbor::prelude::*;
use std::collections::HashMap;

/// Information about a single validator.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ValidatorInfo {
    pub address: Address,
    pub public_key: PublicKey,
    /// Voting power (stake). Only stake-weighted leader election reads it;
    /// quorum counting is one validator, one vote.
    pub voting_power: u64,
}

impl ValidatorInfo {
    /// Build the info for a public key, deriving the address from it.
    pub fn from_public_key(public_key: PublicKey, voting_power: u64) -> Self {
        Self {
            address: public_key.address(),
            public_key,
            voting_power,
        }
    }
}

/// The active validator set, sorted by address.
///
/// Sorting by address gives every node the same deterministic [`NodeId`]
/// assignment: the validator at sorted position `i` is `NodeId(i + 1)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorSet {
    validators: Vec<ValidatorInfo>,
    ids_by_address: HashMap<Address, NodeId>,
}

impl ValidatorSet {
    /// Build a set, sorting by address and dropping duplicate addresses.
    pub fn new(mut validators: Vec<ValidatorInfo>) -> Self {
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators.dedup_by(|a, b| a.address == b.address);
        let ids_by_address = validators
            .iter()
            .enumerate()
            .map(|(i, v)| (v.address, NodeId::from_index(i)))
            .collect();
        Self {
            validators,
            ids_by_address,
        }
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn validators(&self) -> &[ValidatorInfo] {
        &self.validators
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidatorInfo> {
        self.validators.iter()
    }

    pub fn node_id(&self, address: &Address) -> Option<NodeId> {
        self.ids_by_address.get(address).copied()
    }

    pub fn address(&self, node_id: NodeId) -> Option<Address> {
        self.by_node_id(node_id).map(|v| v.address)
    }

    pub fn by_node_id(&self, node_id: NodeId) -> Option<&ValidatorInfo> {
        if node_id.0 == 0 {
            return None;
        }
        self.validators.get(node_id.index())
    }

    pub fn get(&self, address: &Address) -> Option<&ValidatorInfo> {
        self.node_id(address).and_then(|id| self.by_node_id(id))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.ids_by_address.contains_key(address)
    }

    pub fn total_voting_power(&self) -> u64 {
        self.validators.iter().map(|v| v.voting_power).sum()
    }

    /// Whether `count` distinct validators strictly exceed two thirds of the set.
    pub fn is_quorum(&self, count: usize) -> bool {
        !self.is_empty() && count * 3 > self.len() * 2
    }

    /// Smallest number of validators that forms a quorum.
    pub fn quorum_size(&self) -> usize {
        self.len() * 2 / 3 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_key_pair;

    fn set_of(n: u8) -> ValidatorSet {
        ValidatorSet::new(
            (1..=n)
                .map(|i| ValidatorInfo::from_public_key(test_key_pair(i).public_key(), 1))
                .collect(),
        )
    }

    #[test]
    fn test_node_ids_follow_address_order() {
        let set = set_of(4);
        let addresses: Vec<Address> = set.iter().map(|v| v.address).collect();
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);

        for (i, address) in addresses.iter().enumerate() {
            let id = set.node_id(address).unwrap();
            assert_eq!(id, NodeId(i as u64 + 1));
            assert_eq!(set.address(id), Some(*address));
        }
        assert_eq!(set.address(NodeId(0)), None);
        assert_eq!(set.address(NodeId(5)), None);
    }

    #[test]
    fn test_input_order_does_not_change_ids() {
        let forward = set_of(4);
        let mut reversed: Vec<ValidatorInfo> = forward.validators().to_vec();
        reversed.reverse();
        assert_eq!(ValidatorSet::new(reversed), forward);
    }

    #[test]
    fn test_quorum_threshold() {
        let four = set_of(4);
        assert!(!four.is_quorum(2));
        assert!(four.is_quorum(3));
        assert_eq!(four.quorum_size(), 3);

        let seven = set_of(7);
        assert!(!seven.is_quorum(4));
        assert!(seven.is_quorum(5));
        assert_eq!(seven.quorum_size(), 5);

        assert!(!ValidatorSet::default().is_quorum(0));
    }
}
