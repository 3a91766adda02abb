//! Block types.

use crate::{Address, Hash};
use sbor::prelude::*;

/// Opaque transaction bytes. Consensus never interprets them.
pub type Transaction = Vec<u8>;

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct BlockHeader {
    /// Height this block finalizes.
    pub height: u64,
    /// Validator that proposed the block.
    pub proposer: Address,
    /// State hash produced by applying the transactions.
    pub state_hash: Hash,
    /// Hash of the previously committed block ([`Hash::ZERO`] at genesis).
    pub prev_block_hash: Hash,
    /// Encoded commit QC. Empty until the block is committed.
    pub quorum_certificate: Vec<u8>,
}

/// A proposed or committed block.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Canonical block identity.
    ///
    /// Covers every header field except the embedded QC bytes, so attaching
    /// the commit certificate does not change the block's identity.
    pub fn hash(&self) -> Hash {
        let header = &self.header;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"hotstuff/block/v1");
        hasher.update(&header.height.to_le_bytes());
        hasher.update(header.proposer.as_bytes());
        hasher.update(header.state_hash.as_bytes());
        hasher.update(header.prev_block_hash.as_bytes());
        hasher.update(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            hasher.update(&(tx.len() as u64).to_le_bytes());
            hasher.update(tx);
        }
        Hash::from_hash_bytes(*hasher.finalize().as_bytes())
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn proposer(&self) -> Address {
        self.header.proposer
    }

    /// Total transaction payload in bytes.
    pub fn transactions_size(&self) -> usize {
        self.transactions.iter().map(Vec::len).sum()
    }

    /// Whether a commit QC has been embedded.
    pub fn has_quorum_certificate(&self) -> bool {
        !self.header.quorum_certificate.is_empty()
    }
}
