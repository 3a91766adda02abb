//! Recording state-sync collaborator.

use hotstuff_core::{BlockCommittedEvent, StateSync};
use hotstuff_types::Block;
use parking_lot::Mutex;

/// Records everything the engine reports; the runner acts on it.
#[derive(Debug, Default)]
pub struct SimStateSync {
    committed: Mutex<Vec<Block>>,
    unsynced: Mutex<Vec<(u64, u64)>>,
    metadata_requests: Mutex<u64>,
    block_requests: Mutex<Vec<u64>>,
}

impl SimStateSync {
    /// Blocks committed by this node, in commit order.
    pub fn committed(&self) -> Vec<Block> {
        self.committed.lock().clone()
    }

    /// `(local_height, observed_height)` reports.
    pub fn unsynced(&self) -> Vec<(u64, u64)> {
        self.unsynced.lock().clone()
    }

    pub fn metadata_requests(&self) -> u64 {
        *self.metadata_requests.lock()
    }

    pub fn block_requests(&self) -> Vec<u64> {
        self.block_requests.lock().clone()
    }
}

impl StateSync for SimStateSync {
    fn on_block_committed(&self, event: BlockCommittedEvent) {
        self.committed.lock().push(event.block);
    }

    fn on_unsynced(&self, local_height: u64, observed_height: u64) {
        self.unsynced.lock().push((local_height, observed_height));
    }

    fn request_metadata(&self) {
        *self.metadata_requests.lock() += 1;
    }

    fn request_block(&self, height: u64) {
        self.block_requests.lock().push(height);
    }
}
