//! In-memory collaborators for unit tests.

use crate::{Collaborators, ConsensusConfig, ConsensusEngine};
use hotstuff_core::{
    BlockCommittedEvent, ExecutionContext, Network, NetworkError, Persistence, PersistenceError,
    ReadContext, RoundTimer, StateSync, TimerTicket, Utility, UtilityError,
};
use hotstuff_types::test_utils::{test_key_pairs, test_validator_set};
use hotstuff_types::{Address, Block, Hash, HotstuffMessage, KeyPair, Transaction, ValidatorInfo};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn state_hash(height: u64, proposer: &Address, transactions: &[Transaction]) -> Hash {
    let mut parts: Vec<&[u8]> = vec![b"mock-state", proposer.as_bytes()];
    let height = height.to_le_bytes();
    parts.push(&height);
    parts.extend(transactions.iter().map(Vec::as_slice));
    Hash::from_parts(&parts)
}

// ─── Persistence ───────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockStorage {
    validators: Vec<ValidatorInfo>,
    committed: Mutex<BTreeMap<u64, Hash>>,
}

impl MockStorage {
    pub(crate) fn max_height(&self) -> u64 {
        self.committed.lock().keys().next_back().copied().unwrap_or(0)
    }
}

struct MockReadContext {
    validators: Vec<ValidatorInfo>,
    committed: BTreeMap<u64, Hash>,
}

impl ReadContext for MockReadContext {
    fn get_all_validators(&self, _height: u64) -> Result<Vec<ValidatorInfo>, PersistenceError> {
        Ok(self.validators.clone())
    }

    fn get_block_hash(&self, height: u64) -> Result<Option<Hash>, PersistenceError> {
        Ok(self.committed.get(&height).copied())
    }

    fn get_maximum_block_height(&self) -> Result<u64, PersistenceError> {
        Ok(self.committed.keys().next_back().copied().unwrap_or(0))
    }
}

impl Persistence for MockStorage {
    fn new_read_context(&self, _height: u64) -> Result<Box<dyn ReadContext>, PersistenceError> {
        Ok(Box::new(MockReadContext {
            validators: self.validators.clone(),
            committed: self.committed.lock().clone(),
        }))
    }
}

// ─── Utility ───────────────────────────────────────────────────────────────

pub(crate) struct MockUtility {
    storage: Arc<MockStorage>,
    fail_commits: AtomicBool,
}

impl MockUtility {
    pub(crate) fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Give a hand-built block the state hash this utility would compute.
    pub(crate) fn stamp(&self, mut block: Block) -> Block {
        block.header.state_hash = state_hash(block.height(), &block.proposer(), &block.transactions);
        block
    }
}

struct MockContext {
    height: u64,
    storage: Arc<MockStorage>,
    fail_commit: bool,
    staged: Option<(Address, Vec<Transaction>)>,
    applied: Option<Hash>,
}

impl ExecutionContext for MockContext {
    fn create_and_apply_proposal_block(
        &mut self,
        proposer: &Address,
        _max_bytes: u64,
    ) -> Result<(Hash, Vec<Transaction>), UtilityError> {
        let txs = vec![format!("tx-{}", self.height).into_bytes()];
        let hash = state_hash(self.height, proposer, &txs);
        self.staged = Some((*proposer, txs.clone()));
        self.applied = Some(hash);
        Ok((hash, txs))
    }

    fn set_proposal_block(
        &mut self,
        _state_hash: Hash,
        proposer: &Address,
        transactions: &[Transaction],
    ) -> Result<(), UtilityError> {
        self.staged = Some((*proposer, transactions.to_vec()));
        Ok(())
    }

    fn apply_block(&mut self) -> Result<Hash, UtilityError> {
        let (proposer, txs) = self.staged.as_ref().ok_or(UtilityError::NoProposal)?;
        let hash = state_hash(self.height, proposer, txs);
        self.applied = Some(hash);
        Ok(hash)
    }

    fn commit(&mut self, _quorum_certificate: &[u8]) -> Result<(), UtilityError> {
        if self.fail_commit {
            return Err(UtilityError::Commit("injected failure".into()));
        }
        let hash = self.applied.ok_or(UtilityError::NoProposal)?;
        self.storage.committed.lock().insert(self.height, hash);
        Ok(())
    }

    fn release(&mut self) -> Result<(), UtilityError> {
        Ok(())
    }
}

impl Utility for MockUtility {
    fn new_context(&self, height: u64) -> Result<Box<dyn ExecutionContext>, UtilityError> {
        Ok(Box::new(MockContext {
            height,
            storage: self.storage.clone(),
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
            staged: None,
            applied: None,
        }))
    }
}

// ─── Network / state sync / timer ──────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockNetwork {
    broadcasts: Mutex<Vec<HotstuffMessage>>,
    sent: Mutex<Vec<(Address, HotstuffMessage)>>,
}

impl MockNetwork {
    pub(crate) fn broadcasts(&self) -> Vec<HotstuffMessage> {
        self.broadcasts.lock().clone()
    }

    pub(crate) fn sent(&self) -> Vec<(Address, HotstuffMessage)> {
        self.sent.lock().clone()
    }
}

impl Network for MockNetwork {
    fn send(&self, to: &Address, message: HotstuffMessage) -> Result<(), NetworkError> {
        self.sent.lock().push((*to, message));
        Ok(())
    }

    fn broadcast(&self, message: HotstuffMessage) -> Result<(), NetworkError> {
        self.broadcasts.lock().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MockStateSync {
    committed: Mutex<Vec<BlockCommittedEvent>>,
    unsynced: Mutex<Vec<(u64, u64)>>,
    requests: Mutex<Vec<Option<u64>>>,
}

impl MockStateSync {
    pub(crate) fn committed(&self) -> Vec<BlockCommittedEvent> {
        self.committed.lock().clone()
    }

    pub(crate) fn unsynced(&self) -> Vec<(u64, u64)> {
        self.unsynced.lock().clone()
    }

    /// `None` for a metadata request, `Some(height)` for a block request.
    pub(crate) fn requests(&self) -> Vec<Option<u64>> {
        self.requests.lock().clone()
    }
}

impl StateSync for MockStateSync {
    fn on_block_committed(&self, event: BlockCommittedEvent) {
        self.committed.lock().push(event);
    }

    fn on_unsynced(&self, local_height: u64, observed_height: u64) {
        self.unsynced.lock().push((local_height, observed_height));
    }

    fn request_metadata(&self) {
        self.requests.lock().push(None);
    }

    fn request_block(&self, height: u64) {
        self.requests.lock().push(Some(height));
    }
}

struct NoopTimer;

impl RoundTimer for NoopTimer {
    fn arm(&mut self, _ticket: TimerTicket, _timeout: Duration) {}

    fn cancel(&mut self) {}
}

// ─── Harness ───────────────────────────────────────────────────────────────

pub(crate) struct Harness {
    pub engine: ConsensusEngine,
    /// Validator keys in NodeId order: `keys[i]` is `NodeId(i + 1)`.
    pub keys: Vec<KeyPair>,
    pub network: Arc<MockNetwork>,
    pub state_sync: Arc<MockStateSync>,
    pub storage: Arc<MockStorage>,
    pub utility: Arc<MockUtility>,
}

/// A manual-mode engine for the validator at sorted position `me`.
pub(crate) fn harness(n: u8, me: usize) -> Harness {
    let mut keys = test_key_pairs(n);
    keys.sort_by_key(KeyPair::address);
    let set = test_validator_set(&keys);

    let storage = Arc::new(MockStorage {
        validators: set.validators().to_vec(),
        committed: Mutex::new(BTreeMap::new()),
    });
    let utility = Arc::new(MockUtility {
        storage: storage.clone(),
        fail_commits: AtomicBool::new(false),
    });
    let network = Arc::new(MockNetwork::default());
    let state_sync = Arc::new(MockStateSync::default());

    let engine = ConsensusEngine::new(
        ConsensusConfig::for_testing(),
        keys[me].clone(),
        Collaborators {
            persistence: storage.clone(),
            network: network.clone(),
            utility: utility.clone(),
            state_sync: state_sync.clone(),
        },
        Box::new(NoopTimer),
    )
    .unwrap();

    Harness {
        engine,
        keys,
        network,
        state_sync,
        storage,
        utility,
    }
}
