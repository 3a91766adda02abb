//! Per-node consensus state.

use hotstuff_core::{ConsensusNodeState, ExecutionContext};
use hotstuff_types::{
    Address, Block, Hash, HotstuffStep, NodeId, QuorumCertificate, ValidatorSet,
};
use std::fmt;
use tracing::warn;

/// The mutable position of a node in the protocol.
///
/// Only the engine touches this, under its lock.
pub struct ConsensusState {
    pub(crate) height: u64,
    pub(crate) round: u64,
    pub(crate) step: HotstuffStep,

    /// Block being voted on in the current round.
    pub(crate) block: Option<Block>,
    /// Highest Prepare-step certificate of the current round.
    pub(crate) prepare_qc: Option<QuorumCertificate>,
    /// Certificate this node is locked on at the current height.
    pub(crate) locked_qc: Option<QuorumCertificate>,

    pub(crate) leader_id: Option<NodeId>,
    pub(crate) node_id: NodeId,
    pub(crate) address: Address,
    pub(crate) validators: ValidatorSet,

    /// Hash of the last committed block, the parent of the next proposal.
    pub(crate) last_block_hash: Hash,

    pub(crate) execution: Option<Box<dyn ExecutionContext>>,
}

impl ConsensusState {
    pub(crate) fn new(address: Address, height: u64, last_block_hash: Hash) -> Self {
        Self {
            height,
            round: 0,
            step: HotstuffStep::NewRound,
            block: None,
            prepare_qc: None,
            locked_qc: None,
            leader_id: None,
            node_id: NodeId(0),
            address,
            validators: ValidatorSet::default(),
            last_block_hash,
            execution: None,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn step(&self) -> HotstuffStep {
        self.step
    }

    pub fn block(&self) -> Option<&Block> {
        self.block.as_ref()
    }

    pub fn prepare_qc(&self) -> Option<&QuorumCertificate> {
        self.prepare_qc.as_ref()
    }

    pub fn locked_qc(&self) -> Option<&QuorumCertificate> {
        self.locked_qc.as_ref()
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.leader_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn last_block_hash(&self) -> Hash {
        self.last_block_hash
    }

    pub fn is_leader(&self) -> bool {
        self.leader_id == Some(self.node_id)
    }

    pub fn leader_address(&self) -> Option<Address> {
        self.leader_id.and_then(|id| self.validators.address(id))
    }

    pub fn has_execution_context(&self) -> bool {
        self.execution.is_some()
    }

    /// Install a validator set and recompute this node's id within it.
    ///
    /// Returns false when this node is not a member.
    pub(crate) fn set_validators(&mut self, validators: ValidatorSet) -> bool {
        let id = validators.node_id(&self.address);
        self.validators = validators;
        match id {
            Some(id) => {
                self.node_id = id;
                true
            }
            None => {
                self.node_id = NodeId(0);
                false
            }
        }
    }

    /// Forget the leader and everything voted on in the current round.
    pub(crate) fn reset_round(&mut self) {
        self.leader_id = None;
        self.block = None;
        self.prepare_qc = None;
        self.step = HotstuffStep::NewRound;
    }

    pub(crate) fn release_execution(&mut self) {
        if let Some(mut ctx) = self.execution.take() {
            if let Err(e) = ctx.release() {
                warn!(height = self.height, error = %e, "Failed to release execution context");
            }
        }
    }

    pub fn snapshot(&self) -> ConsensusNodeState {
        ConsensusNodeState {
            node_id: self.node_id,
            height: self.height,
            round: self.round,
            step: self.step,
            is_leader: self.is_leader(),
            leader_id: self.leader_id,
        }
    }
}

impl fmt::Debug for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusState")
            .field("node_id", &self.node_id)
            .field("height", &self.height)
            .field("round", &self.round)
            .field("step", &self.step)
            .field("leader_id", &self.leader_id)
            .field("block", &self.block.as_ref().map(Block::hash))
            .field("prepare_qc", &self.prepare_qc.as_ref().map(|qc| (qc.height, qc.round)))
            .field("locked_qc", &self.locked_qc.as_ref().map(|qc| (qc.height, qc.round)))
            .field("has_execution_context", &self.execution.is_some())
            .finish()
    }
}
