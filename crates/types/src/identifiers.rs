//! Validator identifiers.

use sbor::prelude::*;
use std::fmt;

/// Length of a validator address in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Validator address: the first 20 bytes of the blake3 hash of its public key.
///
/// Addresses define the canonical validator ordering used to assign [`NodeId`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// 1-based validator index within the address-sorted validator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BasicSbor)]
#[sbor(transparent)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Zero-based position in the sorted validator list.
    pub fn index(self) -> usize {
        self.0.saturating_sub(1) as usize
    }

    pub fn from_index(index: usize) -> Self {
        NodeId(index as u64 + 1)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
