//! Per-step message pool.

use crate::{MempoolConfig, MempoolError, MessageFifo};
use hotstuff_types::{HotstuffMessage, HotstuffStep};
use tracing::debug;

/// One independent [`MessageFifo`] per HotStuff step.
///
/// Each step has its own byte budget, so a flood of Prepare votes can never
/// evict Commit votes.
#[derive(Debug, Clone)]
pub struct MessagePool {
    queues: [MessageFifo; 5],
}

impl MessagePool {
    pub fn new(config: &MempoolConfig) -> Self {
        let cap = config.max_bytes_per_step;
        Self {
            queues: std::array::from_fn(|_| MessageFifo::new(cap)),
        }
    }

    /// Index a message into the queue for its step.
    pub fn push(&mut self, message: HotstuffMessage) -> Result<(), MempoolError> {
        let step = message.step;
        let evicted = self.queues[step.index()].push(message)?;
        if !evicted.is_empty() {
            debug!(%step, evicted = evicted.len(), "Step pool over budget, evicted oldest messages");
        }
        Ok(())
    }

    pub fn get(&self, step: HotstuffStep) -> &MessageFifo {
        &self.queues[step.index()]
    }

    pub fn get_mut(&mut self, step: HotstuffStep) -> &mut MessageFifo {
        &mut self.queues[step.index()]
    }

    pub fn contains(&self, message: &HotstuffMessage) -> Result<bool, MempoolError> {
        self.get(message.step).contains(message)
    }

    pub fn clear(&mut self, step: HotstuffStep) {
        self.get_mut(step).clear();
    }

    pub fn clear_all(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
    }

    /// Byte budget of each step's queue.
    pub fn max_bytes_per_step(&self) -> usize {
        self.queues[0].max_total_bytes()
    }

    /// Raise every step's budget to at least `bytes`.
    pub fn ensure_capacity(&mut self, bytes: usize) {
        for queue in &mut self.queues {
            queue.ensure_capacity(bytes);
        }
    }

    /// Total messages across all steps.
    pub fn len(&self) -> usize {
        self.queues.iter().map(MessageFifo::size).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(MessageFifo::is_empty)
    }
}
