//! In-memory persistence for one simulated node.

use hotstuff_core::{Persistence, PersistenceError, ReadContext};
use hotstuff_types::{Block, Hash, ValidatorInfo};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Committed blocks and the (static) validator set of one node.
///
/// Tracks how many read contexts are open so tests can check that every
/// context the engine opens is released.
#[derive(Debug)]
pub struct SimStorage {
    validators: Vec<ValidatorInfo>,
    blocks: RwLock<BTreeMap<u64, Block>>,
    open_read_contexts: Arc<AtomicUsize>,
}

impl SimStorage {
    pub fn new(validators: Vec<ValidatorInfo>) -> Self {
        Self {
            validators,
            blocks: RwLock::new(BTreeMap::new()),
            open_read_contexts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn insert_block(&self, block: Block) {
        self.blocks.write().insert(block.height(), block);
    }

    pub fn block(&self, height: u64) -> Option<Block> {
        self.blocks.read().get(&height).cloned()
    }

    pub fn block_hash(&self, height: u64) -> Option<Hash> {
        self.blocks.read().get(&height).map(Block::hash)
    }

    pub fn max_height(&self) -> u64 {
        self.blocks.read().keys().next_back().copied().unwrap_or(0)
    }

    /// All committed blocks, lowest height first.
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks.read().values().cloned().collect()
    }

    pub fn open_read_contexts(&self) -> usize {
        self.open_read_contexts.load(Ordering::SeqCst)
    }
}

struct SimReadContext {
    validators: Vec<ValidatorInfo>,
    max_height: u64,
    hashes: BTreeMap<u64, Hash>,
    open: Arc<AtomicUsize>,
}

impl ReadContext for SimReadContext {
    fn get_all_validators(&self, _height: u64) -> Result<Vec<ValidatorInfo>, PersistenceError> {
        Ok(self.validators.clone())
    }

    fn get_block_hash(&self, height: u64) -> Result<Option<Hash>, PersistenceError> {
        Ok(self.hashes.get(&height).copied())
    }

    fn get_maximum_block_height(&self) -> Result<u64, PersistenceError> {
        Ok(self.max_height)
    }
}

impl Drop for SimReadContext {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Persistence for SimStorage {
    fn new_read_context(&self, _height: u64) -> Result<Box<dyn ReadContext>, PersistenceError> {
        let blocks = self.blocks.read();
        self.open_read_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimReadContext {
            validators: self.validators.clone(),
            max_height: blocks.keys().next_back().copied().unwrap_or(0),
            hashes: blocks.iter().map(|(h, b)| (*h, b.hash())).collect(),
            open: self.open_read_contexts.clone(),
        }))
    }
}
