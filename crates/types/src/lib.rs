//! Core types for HotStuff consensus.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: Hash, ed25519 keys and signatures
//! - **Identifiers**: Address, NodeId
//! - **Consensus types**: Block, HotstuffMessage, QuorumCertificate, PartialSignature
//! - **Validators**: ValidatorInfo, ValidatorSet (address-sorted NodeId mapping)
//! - **Codec**: versioned SBOR encoding for messages and certificates
//!
//! # Design Philosophy
//!
//! This crate is self-contained. It does not depend on any other workspace
//! crates, making it the foundation layer.

mod crypto;
mod hash;
mod identifiers;
mod signing;

// Consensus types
mod block;
pub mod codec;
mod message;
mod quorum_certificate;
mod validator;

pub use crypto::{KeyPair, PublicKey, SIGNATURE_LENGTH};
pub use hash::{Hash, HexError};
pub use identifiers::{Address, NodeId, ADDRESS_LENGTH};
pub use signing::{vote_message, DOMAIN_HOTSTUFF_VOTE};

pub use block::{Block, BlockHeader, Transaction};
pub use codec::CodecError;
pub use message::{HotstuffMessage, HotstuffMessageType, HotstuffStep, Justification, MessageError};
pub use quorum_certificate::{PartialSignature, QuorumCertificate};
pub use validator::{ValidatorInfo, ValidatorSet};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Deterministic key pair from a seed byte.
    pub fn test_key_pair(seed: u8) -> KeyPair {
        KeyPair::from_seed(&[seed; 32])
    }

    /// `n` deterministic key pairs, seeds `1..=n`.
    pub fn test_key_pairs(n: u8) -> Vec<KeyPair> {
        (1..=n).map(test_key_pair).collect()
    }

    /// Equal-power validator set for the given keys.
    pub fn test_validator_set(keys: &[KeyPair]) -> ValidatorSet {
        ValidatorSet::new(
            keys.iter()
                .map(|k| ValidatorInfo::from_public_key(k.public_key(), 1))
                .collect(),
        )
    }

    /// A small block at `height` proposed by `proposer`.
    pub fn test_block(height: u64, proposer: &KeyPair) -> Block {
        test_block_with_txs(height, proposer, vec![format!("tx-{height}").into_bytes()])
    }

    pub fn test_block_with_txs(height: u64, proposer: &KeyPair, transactions: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                height,
                proposer: proposer.address(),
                state_hash: Hash::from_parts(&[b"state", &height.to_le_bytes()]),
                prev_block_hash: Hash::ZERO,
                quorum_certificate: Vec::new(),
            },
            transactions,
        }
    }

    /// A QC over `block` signed by every key in `signers`.
    pub fn test_quorum_certificate(
        height: u64,
        round: u64,
        step: HotstuffStep,
        block: &Block,
        signers: &[KeyPair],
    ) -> QuorumCertificate {
        let bytes = vote_message(height, round, step, Some(block.hash()));
        QuorumCertificate {
            height,
            round,
            step,
            block: Some(block.clone()),
            threshold_signature: signers
                .iter()
                .map(|k| PartialSignature {
                    signer: k.address(),
                    signature: k.sign(&bytes),
                })
                .collect(),
        }
    }
}
