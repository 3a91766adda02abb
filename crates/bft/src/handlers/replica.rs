//! Replica side: validate the leader's proposals and vote.

use super::{validate_basic, StepHandler};
use crate::engine::{with_quorum_certificate, ConsensusCore};
use crate::validation;
use crate::ConsensusError;
use hotstuff_core::Action;
use hotstuff_types::{Block, HotstuffMessage, HotstuffStep, QuorumCertificate};
use tracing::{debug, error, info, warn};

pub(crate) struct ReplicaHandler;

impl StepHandler for ReplicaHandler {
    fn on_new_round(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        validate_basic(core, &msg)?;
        core.refresh_execution_context()?;
        core.state.step = HotstuffStep::Prepare;
        Ok(())
    }

    fn on_prepare(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        validate_basic(core, &msg)?;
        let checked = validation::validate_proposal(
            &msg,
            core.state.leader_address(),
            core.state.locked_qc.as_ref(),
            &core.state.validators,
            core.config.max_block_bytes,
        );
        if let Err(e) = checked {
            warn!(
                node = %core.state.node_id,
                height = msg.height,
                round = msg.round,
                error = %e,
                "Rejecting proposal"
            );
            core.interrupt_round("invalid proposal");
            return Err(e.into());
        }
        let Some(block) = msg.block else {
            return Ok(());
        };

        if let Err(e) = core.apply_block(&block) {
            error!(node = %core.state.node_id, height = msg.height, error = %e, "Failed to apply proposed block");
            core.interrupt_round("failed to apply block");
            return Err(e);
        }
        debug!(
            node = %core.state.node_id,
            height = msg.height,
            round = msg.round,
            block_hash = ?block.hash(),
            "Accepted proposal"
        );
        core.state.step = HotstuffStep::PreCommit;
        core.send_vote(HotstuffStep::Prepare, &block);
        core.state.block = Some(block);
        Ok(())
    }

    fn on_pre_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        let (qc, block) = core.certified_proposal(&msg)?;
        core.state.prepare_qc = Some(qc);
        core.state.step = HotstuffStep::Commit;
        core.send_vote(HotstuffStep::PreCommit, &block);
        Ok(())
    }

    fn on_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        let (qc, block) = core.certified_proposal(&msg)?;
        debug!(node = %core.state.node_id, height = qc.height, round = qc.round, "Locked on block");
        core.state.locked_qc = Some(qc);
        core.state.step = HotstuffStep::Decide;
        core.send_vote(HotstuffStep::Commit, &block);
        Ok(())
    }

    fn on_decide(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        let (qc, block) = core.certified_proposal(&msg)?;
        let committed = with_quorum_certificate(block, &qc).and_then(|block| core.commit_block(block));
        if let Err(e) = committed {
            error!(node = %core.state.node_id, height = msg.height, error = %e, "Failed to commit block");
            core.interrupt_round("commit failed");
            return Err(e);
        }
        core.advance_height();
        Ok(())
    }
}

impl ConsensusCore {
    /// Validate a PreCommit/Commit/Decide proposal and return its certificate
    /// and block. A bad certificate interrupts the round.
    fn certified_proposal(&mut self, msg: &HotstuffMessage) -> Result<(QuorumCertificate, Block), ConsensusError> {
        validate_basic(self, msg)?;
        let checked = validation::validate_step_certificate(msg, &self.state.validators)
            .map(QuorumCertificate::clone)
            .and_then(|qc| {
                msg.block
                    .clone()
                    .map(|block| (qc, block))
                    .ok_or(validation::ValidationError::MissingBlock { step: msg.step })
            });
        match checked {
            Ok(certified) => Ok(certified),
            Err(e) => {
                warn!(
                    node = %self.state.node_id,
                    height = msg.height,
                    round = msg.round,
                    step = %msg.step,
                    error = %e,
                    "Rejecting certificate"
                );
                self.interrupt_round("invalid quorum certificate");
                Err(e.into())
            }
        }
    }

    /// Sign a vote for `block` and send it to the current leader.
    fn send_vote(&mut self, step: HotstuffStep, block: &Block) {
        let (height, round) = (self.state.height, self.state.round);
        let vote = match HotstuffMessage::vote(height, round, step, block, &self.signing_key) {
            Ok(vote) => vote,
            Err(e) => {
                error!(height, round, %step, error = %e, "Failed to build vote");
                return;
            }
        };
        let Some(leader) = self.state.leader_address() else {
            warn!(height, round, %step, "No leader to send vote to");
            return;
        };
        info!(node = %self.state.node_id, height, round, %step, "Voting");
        self.actions.push(Action::Send { to: leader, message: vote });
    }
}
