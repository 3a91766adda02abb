//! Deterministic execution for simulated nodes.
//!
//! Transactions are opaque; the state hash is a hash over the height, the
//! proposer and the transactions, so every node applying the same block
//! computes the same hash.

use crate::SimStorage;
use hotstuff_core::{ExecutionContext, Utility, UtilityError};
use hotstuff_types::{Address, Block, BlockHeader, Hash, Transaction};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// State hash of applying `transactions` proposed by `proposer` at `height`.
pub fn sim_state_hash(height: u64, proposer: &Address, transactions: &[Transaction]) -> Hash {
    let height = height.to_le_bytes();
    let mut parts: Vec<&[u8]> = vec![b"sim/state", &height, proposer.as_bytes()];
    parts.extend(transactions.iter().map(Vec::as_slice));
    Hash::from_parts(&parts)
}

/// Execution engine of one simulated node.
#[derive(Debug)]
pub struct SimUtility {
    storage: Arc<SimStorage>,
    pending: Arc<Mutex<VecDeque<Transaction>>>,
    open_contexts: Arc<AtomicUsize>,
    fail_commits: Arc<AtomicBool>,
}

impl SimUtility {
    pub fn new(storage: Arc<SimStorage>) -> Self {
        Self {
            storage,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            open_contexts: Arc::new(AtomicUsize::new(0)),
            fail_commits: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn submit_transaction(&self, tx: Transaction) {
        self.pending.lock().push_back(tx);
    }

    pub fn pending_transactions(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of execution contexts opened and not yet released.
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    /// Make every subsequent commit fail.
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }
}

impl Utility for SimUtility {
    fn new_context(&self, height: u64) -> Result<Box<dyn ExecutionContext>, UtilityError> {
        self.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimExecutionContext {
            height,
            storage: self.storage.clone(),
            pending: self.pending.clone(),
            open_contexts: self.open_contexts.clone(),
            fail_commits: self.fail_commits.clone(),
            proposal: None,
            applied: None,
            released: false,
        }))
    }
}

#[derive(Debug, Clone)]
struct Proposal {
    proposer: Address,
    transactions: Vec<Transaction>,
}

struct SimExecutionContext {
    height: u64,
    storage: Arc<SimStorage>,
    pending: Arc<Mutex<VecDeque<Transaction>>>,
    open_contexts: Arc<AtomicUsize>,
    fail_commits: Arc<AtomicBool>,
    proposal: Option<Proposal>,
    applied: Option<Hash>,
    released: bool,
}

impl SimExecutionContext {
    fn check_open(&self) -> Result<(), UtilityError> {
        if self.released {
            return Err(UtilityError::Released);
        }
        Ok(())
    }
}

impl ExecutionContext for SimExecutionContext {
    fn create_and_apply_proposal_block(
        &mut self,
        proposer: &Address,
        max_bytes: u64,
    ) -> Result<(Hash, Vec<Transaction>), UtilityError> {
        self.check_open()?;
        // Reaped transactions stay in the pool until their block commits.
        let mut transactions = Vec::new();
        let mut size = 0u64;
        for tx in self.pending.lock().iter() {
            if size + tx.len() as u64 > max_bytes {
                break;
            }
            size += tx.len() as u64;
            transactions.push(tx.clone());
        }
        let hash = sim_state_hash(self.height, proposer, &transactions);
        trace!(height = self.height, txs = transactions.len(), "Reaped proposal transactions");
        self.proposal = Some(Proposal {
            proposer: *proposer,
            transactions: transactions.clone(),
        });
        self.applied = Some(hash);
        Ok((hash, transactions))
    }

    fn set_proposal_block(
        &mut self,
        _state_hash: Hash,
        proposer: &Address,
        transactions: &[Transaction],
    ) -> Result<(), UtilityError> {
        self.check_open()?;
        self.proposal = Some(Proposal {
            proposer: *proposer,
            transactions: transactions.to_vec(),
        });
        self.applied = None;
        Ok(())
    }

    fn apply_block(&mut self) -> Result<Hash, UtilityError> {
        self.check_open()?;
        let proposal = self.proposal.as_ref().ok_or(UtilityError::NoProposal)?;
        let hash = sim_state_hash(self.height, &proposal.proposer, &proposal.transactions);
        self.applied = Some(hash);
        Ok(hash)
    }

    fn commit(&mut self, quorum_certificate: &[u8]) -> Result<(), UtilityError> {
        self.check_open()?;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(UtilityError::Commit("injected commit failure".into()));
        }
        let proposal = self.proposal.clone().ok_or(UtilityError::NoProposal)?;
        let state_hash = self.applied.ok_or(UtilityError::NoProposal)?;

        let prev_block_hash = self
            .height
            .checked_sub(1)
            .and_then(|h| self.storage.block_hash(h))
            .unwrap_or(Hash::ZERO);
        {
            let mut pending = self.pending.lock();
            pending.retain(|tx| !proposal.transactions.contains(tx));
        }
        self.storage.insert_block(Block {
            header: BlockHeader {
                height: self.height,
                proposer: proposal.proposer,
                state_hash,
                prev_block_hash,
                quorum_certificate: quorum_certificate.to_vec(),
            },
            transactions: proposal.transactions,
        });
        Ok(())
    }

    fn release(&mut self) -> Result<(), UtilityError> {
        if !self.released {
            self.released = true;
            self.open_contexts.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for SimExecutionContext {
    fn drop(&mut self) {
        if !self.released {
            self.open_contexts.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotstuff_types::test_utils::test_key_pair;

    #[test]
    fn test_proposal_and_replay_agree() {
        let proposer = test_key_pair(1).address();
        let leader = SimUtility::new(Arc::new(SimStorage::new(Vec::new())));
        leader.submit_transaction(b"a".to_vec());
        leader.submit_transaction(b"b".to_vec());

        let mut ctx = leader.new_context(1).unwrap();
        let (hash, txs) = ctx.create_and_apply_proposal_block(&proposer, 1024).unwrap();
        assert_eq!(txs.len(), 2);

        let replica = SimUtility::new(Arc::new(SimStorage::new(Vec::new())));
        let mut replay = replica.new_context(1).unwrap();
        replay.set_proposal_block(hash, &proposer, &txs).unwrap();
        assert_eq!(replay.apply_block().unwrap(), hash);
    }

    #[test]
    fn test_reap_respects_byte_limit() {
        let utility = SimUtility::new(Arc::new(SimStorage::new(Vec::new())));
        for _ in 0..4 {
            utility.submit_transaction(vec![0u8; 10]);
        }
        let mut ctx = utility.new_context(1).unwrap();
        let (_, txs) = ctx
            .create_and_apply_proposal_block(&test_key_pair(1).address(), 25)
            .unwrap();
        assert_eq!(txs.len(), 2);
    }

    #[test]
    fn test_commit_persists_and_prunes_pool() {
        let storage = Arc::new(SimStorage::new(Vec::new()));
        let utility = SimUtility::new(storage.clone());
        utility.submit_transaction(b"a".to_vec());

        let mut ctx = utility.new_context(1).unwrap();
        ctx.create_and_apply_proposal_block(&test_key_pair(1).address(), 1024)
            .unwrap();
        ctx.commit(b"qc").unwrap();
        ctx.release().unwrap();

        assert_eq!(storage.max_height(), 1);
        assert_eq!(storage.block(1).unwrap().header.quorum_certificate, b"qc".to_vec());
        assert_eq!(utility.pending_transactions(), 0);
        assert_eq!(utility.open_contexts(), 0);
    }

    #[test]
    fn test_released_context_rejects_work() {
        let utility = SimUtility::new(Arc::new(SimStorage::new(Vec::new())));
        let mut ctx = utility.new_context(1).unwrap();
        assert_eq!(utility.open_contexts(), 1);
        ctx.release().unwrap();
        assert_eq!(ctx.apply_block(), Err(UtilityError::Released));
        drop(ctx);
        assert_eq!(utility.open_contexts(), 0);
    }

    #[test]
    fn test_injected_commit_failure() {
        let utility = SimUtility::new(Arc::new(SimStorage::new(Vec::new())));
        utility.set_fail_commits(true);
        let mut ctx = utility.new_context(1).unwrap();
        ctx.create_and_apply_proposal_block(&test_key_pair(1).address(), 1024)
            .unwrap();
        assert!(matches!(ctx.commit(&[]), Err(UtilityError::Commit(_))));
    }
}
