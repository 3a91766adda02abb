//! The consensus engine.
//!
//! [`ConsensusEngine`] is the thread-safe entry point. All consensus state
//! lives in a [`ConsensusCore`] behind one mutex; handlers run to completion
//! under the lock and record [`Action`]s, which are dispatched to the
//! collaborators after the lock is released.

use crate::handlers::Role;
use crate::pacemaker::{Pacemaker, Verdict};
use crate::{
    CommitError, ConsensusConfig, ConsensusError, ConsensusState, LeaderElection, RoundRobin,
};
use hotstuff_core::{
    Action, BlockCommittedEvent, ConsensusNodeState, DebugCommand, Network, Persistence,
    RoundTimer, StateSync, TimerTicket, Utility,
};
use hotstuff_mempool::MessagePool;
use hotstuff_types::{
    codec, Block, Hash, HotstuffMessage, HotstuffStep, KeyPair, NodeId, QuorumCertificate,
    ValidatorSet,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// External services the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub persistence: Arc<dyn Persistence>,
    pub network: Arc<dyn Network>,
    pub utility: Arc<dyn Utility>,
    pub state_sync: Arc<dyn StateSync>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Core (runs under the engine lock)
// ═══════════════════════════════════════════════════════════════════════════

pub(crate) struct ConsensusCore {
    pub(crate) state: ConsensusState,
    pub(crate) pacemaker: Pacemaker,
    pub(crate) mempool: MessagePool,
    pub(crate) election: Box<dyn LeaderElection>,
    pub(crate) persistence: Arc<dyn Persistence>,
    pub(crate) utility: Arc<dyn Utility>,
    pub(crate) signing_key: KeyPair,
    pub(crate) config: ConsensusConfig,
    pub(crate) actions: Vec<Action>,
}

impl ConsensusCore {
    fn load_validators(&self, height: u64) -> Result<ValidatorSet, ConsensusError> {
        let ctx = self.persistence.new_read_context(height)?;
        Ok(ValidatorSet::new(ctx.get_all_validators(height)?))
    }

    /// Reload the validator set for the current height.
    pub(crate) fn refresh_validators(&mut self) -> Result<(), ConsensusError> {
        let validators = self.load_validators(self.state.height)?;
        if !self.state.set_validators(validators) {
            return Err(ConsensusError::NotAValidator(self.state.address));
        }
        let required = self
            .config
            .required_bytes_per_step(self.state.validators.quorum_size());
        if self.mempool.max_bytes_per_step() < required {
            info!(
                configured = self.mempool.max_bytes_per_step(),
                required,
                validators = self.state.validators.len(),
                "Raising per-step message budget to hold a quorum of votes"
            );
            self.mempool.ensure_capacity(required);
        }
        Ok(())
    }

    pub(crate) fn start(&mut self) {
        info!(
            node = %self.state.node_id,
            height = self.state.height,
            manual = self.pacemaker.is_manual_mode(),
            "Starting consensus"
        );
        if !self.pacemaker.is_manual_mode() {
            self.advance_height();
        }
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(node = %self.state.node_id, height = msg.height, round = msg.round, step = %msg.step)
    )]
    pub(crate) fn handle_message(&mut self, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        debug!(
            node = %self.state.node_id,
            msg_type = ?msg.message_type,
            height = msg.height,
            round = msg.round,
            step = %msg.step,
            "Received hotstuff message"
        );

        let verdict =
            self.pacemaker
                .should_handle_message(&mut self.state, &msg, &mut self.actions)?;
        let elect = match verdict {
            Verdict::Reject(reason) => {
                debug!(node = %self.state.node_id, ?reason, "Discarding hotstuff message");
                return Ok(());
            }
            Verdict::Accept => false,
            Verdict::CatchUp { elect_leader } => elect_leader,
        };

        if elect || (self.state.leader_id.is_none() && msg.step == HotstuffStep::NewRound) {
            if let Err(e) = self.elect_next_leader(msg.height, msg.round) {
                error!(node = %self.state.node_id, error = %e, "Leader election failed");
                self.pacemaker.restart_timer(&self.state);
                return Err(e);
            }
        }

        let role = self.role();
        let result = role.handler().dispatch(self, msg);
        self.pacemaker.restart_timer(&self.state);
        result
    }

    fn elect_next_leader(&mut self, height: u64, round: u64) -> Result<(), ConsensusError> {
        let validators = self.load_validators(height)?;
        let leader = self.election.elect_next_leader(&validators, height, round)?;
        if !self.state.set_validators(validators) {
            return Err(ConsensusError::NotAValidator(self.state.address));
        }
        self.state.leader_id = Some(leader);
        info!(
            node = %self.state.node_id,
            height,
            round,
            leader = %leader,
            role = ?self.role(),
            "Elected leader"
        );
        Ok(())
    }

    pub(crate) fn role(&self) -> Role {
        if self.state.is_leader() {
            Role::Leader
        } else {
            Role::Replica
        }
    }

    // ───────────────────────────────────────────────────────────────────────
    // Execution
    // ───────────────────────────────────────────────────────────────────────

    /// Open a fresh execution context for the current height, releasing any
    /// context still open.
    pub(crate) fn refresh_execution_context(&mut self) -> Result<(), ConsensusError> {
        if self.state.execution.is_some() {
            warn!(height = self.state.height, "Execution context already open, releasing it");
            self.state.release_execution();
        }
        let ctx = self.utility.new_context(self.state.height)?;
        self.state.execution = Some(ctx);
        Ok(())
    }

    pub(crate) fn release_execution_context(&mut self) {
        self.state.release_execution();
    }

    /// Build a new block from the execution context's pending transactions.
    pub(crate) fn prepare_block(&mut self) -> Result<Block, ConsensusError> {
        let height = self.state.height;
        let proposer = self.signing_key.address();
        let max_bytes = self.config.max_block_bytes;
        let ctx = self
            .state
            .execution
            .as_mut()
            .ok_or(CommitError::NoExecutionContext { height })?;
        let (state_hash, transactions) = ctx.create_and_apply_proposal_block(&proposer, max_bytes)?;
        Ok(Block {
            header: hotstuff_types::BlockHeader {
                height,
                proposer,
                state_hash,
                prev_block_hash: self.state.last_block_hash,
                quorum_certificate: Vec::new(),
            },
            transactions,
        })
    }

    /// Stage and apply someone else's block, checking the resulting state hash.
    pub(crate) fn apply_block(&mut self, block: &Block) -> Result<(), ConsensusError> {
        if self.state.execution.is_none() {
            self.refresh_execution_context()?;
        }
        let height = self.state.height;
        let ctx = self
            .state
            .execution
            .as_mut()
            .ok_or(CommitError::NoExecutionContext { height })?;
        ctx.set_proposal_block(block.header.state_hash, &block.header.proposer, &block.transactions)?;
        let actual = ctx.apply_block()?;
        if actual != block.header.state_hash {
            return Err(ConsensusError::StateHashMismatch {
                expected: block.header.state_hash,
                actual,
            });
        }
        Ok(())
    }

    /// Persist a decided block carrying its commit certificate.
    pub(crate) fn commit_block(&mut self, block: Block) -> Result<(), ConsensusError> {
        let height = block.height();
        let hash = block.hash();

        let applied = self.state.execution.is_some()
            && self.state.block.as_ref().map(Block::hash) == Some(hash);
        if !applied {
            debug!(height, block_hash = ?hash, "Applying block before commit");
            self.refresh_execution_context()?;
            self.apply_block(&block)?;
        }

        let ctx = self
            .state
            .execution
            .as_mut()
            .ok_or(CommitError::NoExecutionContext { height })?;
        ctx.commit(&block.header.quorum_certificate)
            .map_err(|source| CommitError::Execution { height, source })?;

        info!(
            node = %self.state.node_id,
            height,
            round = self.state.round,
            block_hash = ?hash,
            txs = block.transactions.len(),
            "Committed block"
        );
        self.state.last_block_hash = hash;
        self.release_execution_context();
        self.actions
            .push(Action::BlockCommitted(BlockCommittedEvent { height, block }));
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────────
    // View changes
    // ───────────────────────────────────────────────────────────────────────

    pub(crate) fn interrupt_round(&mut self, reason: &str) {
        self.pacemaker
            .interrupt_round(&mut self.state, &mut self.mempool, reason, &mut self.actions);
    }

    pub(crate) fn advance_height(&mut self) {
        self.pacemaker
            .new_height(&mut self.state, &mut self.mempool, &mut self.actions);
        if let Err(e) = self.refresh_validators() {
            warn!(height = self.state.height, error = %e, "Failed to refresh validators");
        }
    }

    pub(crate) fn force_next_view(&mut self) {
        self.pacemaker
            .force_next_view(&mut self.state, &mut self.mempool, &mut self.actions);
    }

    pub(crate) fn on_round_timeout(&mut self, ticket: TimerTicket) {
        if !self.pacemaker.is_current(ticket) {
            debug!(
                height = ticket.height,
                round = ticket.round,
                generation = ticket.generation,
                "Ignoring stale round timeout"
            );
            return;
        }
        self.interrupt_round("timeout");
    }
}

/// Attach an encoded commit certificate to a block header.
pub(crate) fn with_quorum_certificate(
    mut block: Block,
    qc: &QuorumCertificate,
) -> Result<Block, ConsensusError> {
    block.header.quorum_certificate = codec::encode_quorum_certificate(qc)?;
    Ok(block)
}

// ═══════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════

/// Thread-safe HotStuff consensus engine for one validator.
pub struct ConsensusEngine {
    core: Mutex<ConsensusCore>,
    network: Arc<dyn Network>,
    state_sync: Arc<dyn StateSync>,
}

impl ConsensusEngine {
    /// Build an engine positioned at the highest persisted height.
    pub fn new(
        config: ConsensusConfig,
        signing_key: KeyPair,
        collaborators: Collaborators,
        timer: Box<dyn RoundTimer>,
    ) -> Result<Self, ConsensusError> {
        let Collaborators {
            persistence,
            network,
            utility,
            state_sync,
        } = collaborators;

        let (height, last_block_hash) = {
            let ctx = persistence.new_read_context(0)?;
            let height = ctx.get_maximum_block_height()?;
            let hash = if height == 0 {
                Hash::ZERO
            } else {
                ctx.get_block_hash(height)?.unwrap_or(Hash::ZERO)
            };
            (height, hash)
        };

        let pacemaker = Pacemaker::new(config.pacemaker.timeout(), config.pacemaker.manual, timer);
        let mut core = ConsensusCore {
            state: ConsensusState::new(signing_key.address(), height, last_block_hash),
            pacemaker,
            mempool: MessagePool::new(&config.mempool()),
            election: Box::new(RoundRobin),
            persistence,
            utility,
            signing_key,
            config,
            actions: Vec::new(),
        };
        core.refresh_validators()?;

        info!(
            node = %core.state.node_id,
            address = %core.state.address,
            height,
            validators = core.state.validators.len(),
            "Consensus engine created"
        );

        Ok(Self {
            core: Mutex::new(core),
            network,
            state_sync,
        })
    }

    /// Replace the default round-robin leader election.
    pub fn with_leader_election(mut self, election: Box<dyn LeaderElection>) -> Self {
        self.core.get_mut().election = election;
        self
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut ConsensusCore) -> R) -> R {
        let (result, actions) = {
            let mut core = self.core.lock();
            let result = f(&mut core);
            (result, std::mem::take(&mut core.actions))
        };
        self.dispatch(actions);
        result
    }

    fn dispatch(&self, actions: Vec<Action>) {
        for action in actions {
            let name = action.type_name();
            let result = match action {
                Action::Broadcast { message } => self.network.broadcast(message),
                Action::Send { to, message } => self.network.send(&to, message),
                Action::BlockCommitted(event) => {
                    self.state_sync.on_block_committed(event);
                    Ok(())
                }
                Action::Unsynced {
                    local_height,
                    observed_height,
                } => {
                    self.state_sync.on_unsynced(local_height, observed_height);
                    Ok(())
                }
                Action::RequestMetadata => {
                    self.state_sync.request_metadata();
                    Ok(())
                }
                Action::RequestBlock { height } => {
                    self.state_sync.request_block(height);
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(action = name, error = %e, "Failed to dispatch action");
            }
        }
    }

    /// Begin participating. In manual mode only loads state and waits for a
    /// debug trigger.
    pub fn start(&self) {
        self.with_core(ConsensusCore::start)
    }

    /// Process a decoded message. Dropped and invalid messages are not errors.
    pub fn handle_message(&self, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        self.with_core(|core| core.handle_message(msg))
    }

    /// Decode and process a message from the wire.
    pub fn handle_message_bytes(&self, data: &[u8]) -> Result<(), ConsensusError> {
        let msg = codec::decode_message(data)?;
        self.handle_message(msg)
    }

    pub fn on_round_timeout(&self, ticket: TimerTicket) {
        self.with_core(|core| core.on_round_timeout(ticket))
    }

    pub fn handle_debug_command(&self, command: DebugCommand) -> Result<(), ConsensusError> {
        self.with_core(|core| core.handle_debug_command(command))
    }

    /// Accept a committed block from state sync.
    pub fn handle_synced_block(&self, block: Block) -> Result<(), ConsensusError> {
        self.with_core(|core| core.handle_synced_block(block))
    }

    pub fn commit_block(&self, block: Block) -> Result<(), ConsensusError> {
        self.with_core(|core| core.commit_block(block))
    }

    pub fn refresh_execution_context(&self) -> Result<(), ConsensusError> {
        self.with_core(ConsensusCore::refresh_execution_context)
    }

    pub fn release_execution_context(&self) {
        self.with_core(ConsensusCore::release_execution_context)
    }

    pub fn interrupt_round(&self, reason: &str) {
        self.with_core(|core| core.interrupt_round(reason))
    }

    pub fn new_height(&self) {
        self.with_core(ConsensusCore::advance_height)
    }

    pub fn force_next_view(&self) {
        self.with_core(ConsensusCore::force_next_view)
    }

    pub fn set_manual_mode(&self, manual: bool) {
        self.core.lock().pacemaker.set_manual_mode(manual);
    }

    pub fn is_manual_mode(&self) -> bool {
        self.core.lock().pacemaker.is_manual_mode()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Accessors
    // ───────────────────────────────────────────────────────────────────────

    pub fn node_state(&self) -> ConsensusNodeState {
        self.core.lock().state.snapshot()
    }

    pub fn height(&self) -> u64 {
        self.core.lock().state.height
    }

    pub fn round(&self) -> u64 {
        self.core.lock().state.round
    }

    pub fn step(&self) -> HotstuffStep {
        self.core.lock().state.step
    }

    pub fn node_id(&self) -> NodeId {
        self.core.lock().state.node_id
    }

    pub fn leader_id(&self) -> Option<NodeId> {
        self.core.lock().state.leader_id
    }

    pub fn is_leader(&self) -> bool {
        self.core.lock().state.is_leader()
    }

    pub fn block(&self) -> Option<Block> {
        self.core.lock().state.block.clone()
    }

    pub fn prepare_qc(&self) -> Option<QuorumCertificate> {
        self.core.lock().state.prepare_qc.clone()
    }

    pub fn locked_qc(&self) -> Option<QuorumCertificate> {
        self.core.lock().state.locked_qc.clone()
    }

    pub fn last_block_hash(&self) -> Hash {
        self.core.lock().state.last_block_hash
    }

    pub fn has_execution_context(&self) -> bool {
        self.core.lock().state.has_execution_context()
    }

    /// Messages currently pooled for `step`.
    pub fn pooled_messages(&self, step: HotstuffStep) -> usize {
        self.core.lock().mempool.get(step).size()
    }

    // ───────────────────────────────────────────────────────────────────────
    // Debug setters (test harnesses only)
    // ───────────────────────────────────────────────────────────────────────

    pub fn set_height(&self, height: u64) {
        self.core.lock().state.height = height;
    }

    pub fn set_round(&self, round: u64) {
        self.core.lock().state.round = round;
    }

    pub fn set_step(&self, step: HotstuffStep) {
        self.core.lock().state.step = step;
    }

    pub fn set_block(&self, block: Option<Block>) {
        self.core.lock().state.block = block;
    }

    pub fn set_leader_id(&self, leader: Option<NodeId>) {
        self.core.lock().state.leader_id = leader;
    }

    pub fn set_locked_qc(&self, qc: Option<QuorumCertificate>) {
        self.core.lock().state.locked_qc = qc;
    }
}

impl std::fmt::Debug for ConsensusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusEngine")
            .field("state", &self.core.lock().state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::harness;
    use crate::{quorum, ConsensusError, StakeWeighted, DEFAULT_MAX_BLOCK_BYTES};
    use hotstuff_core::DebugCommand;
    use hotstuff_mempool::DEFAULT_MAX_BYTES_PER_STEP;
    use hotstuff_types::test_utils::test_block_with_txs;
    use hotstuff_types::{codec, CodecError, HotstuffMessage, HotstuffStep, NodeId};

    #[test]
    fn test_engine_starts_at_persisted_height() {
        let h = harness(4, 0);
        assert_eq!(h.engine.height(), 0);
        assert_eq!(h.engine.node_id(), NodeId(1));
        assert!(h.engine.leader_id().is_none());
        assert!(!h.engine.has_execution_context());
    }

    #[test]
    fn test_single_validator_commits_alone() {
        let h = harness(1, 0);
        h.engine.handle_debug_command(DebugCommand::TriggerNextView).unwrap();
        let new_round = h.network.broadcasts().pop().unwrap();
        h.engine.handle_message(new_round).unwrap();

        assert_eq!(h.engine.height(), 2);
        assert_eq!(h.state_sync.committed().len(), 1);
        assert_eq!(h.storage.max_height(), 1);
    }

    #[test]
    fn test_future_height_reports_unsynced() {
        let h = harness(4, 1);
        h.engine.set_height(2);
        h.engine.handle_message(HotstuffMessage::new_round(5, 0, None)).unwrap();
        assert_eq!(h.state_sync.unsynced(), vec![(2, 5)]);
        assert_eq!(h.engine.height(), 2);
    }

    #[test]
    fn test_message_bytes_are_decoded() {
        let h = harness(4, 1);
        h.engine.set_height(1);
        let bytes = codec::encode_message(&HotstuffMessage::new_round(1, 0, None)).unwrap();
        h.engine.handle_message_bytes(&bytes).unwrap();
        assert_eq!(h.engine.step(), HotstuffStep::Prepare);

        assert_eq!(
            h.engine.handle_message_bytes(&[]),
            Err(ConsensusError::Codec(CodecError::MessageTooShort))
        );
    }

    #[test]
    fn test_custom_leader_election() {
        let h = harness(4, 1);
        let engine = h.engine.with_leader_election(Box::new(StakeWeighted));
        engine.set_height(1);
        engine.handle_message(HotstuffMessage::new_round(1, 0, None)).unwrap();
        assert!(engine.leader_id().is_some());
    }

    #[test]
    fn test_step_budget_holds_a_quorum_of_full_blocks() {
        let h = harness(10, 0);
        let block = test_block_with_txs(1, &h.keys[0], vec![vec![7u8; DEFAULT_MAX_BLOCK_BYTES as usize]]);
        let votes: Vec<HotstuffMessage> = h.keys[..7]
            .iter()
            .map(|k| HotstuffMessage::vote(1, 0, HotstuffStep::Prepare, &block, k).unwrap())
            .collect();

        let mut core = h.engine.core.lock();
        assert!(core.mempool.max_bytes_per_step() > DEFAULT_MAX_BYTES_PER_STEP);
        for vote in votes {
            core.mempool.push(vote).unwrap();
        }
        assert_eq!(core.mempool.get(HotstuffStep::Prepare).size(), 7);

        let qc = quorum::build_qc(
            1,
            0,
            HotstuffStep::Prepare,
            &block,
            core.mempool.get(HotstuffStep::Prepare).iter(),
            &core.state.validators,
        )
        .unwrap();
        assert_eq!(qc.signer_count(), 7);
    }

    #[test]
    fn test_small_validator_set_keeps_configured_budget() {
        let h = harness(4, 0);
        assert_eq!(
            h.engine.core.lock().mempool.max_bytes_per_step(),
            DEFAULT_MAX_BYTES_PER_STEP
        );
    }
}
