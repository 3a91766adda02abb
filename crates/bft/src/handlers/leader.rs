//! Leader side: aggregate votes into certificates and drive the round.

use super::{validate_basic, StepHandler};
use crate::engine::{with_quorum_certificate, ConsensusCore};
use crate::quorum::{self, QcError};
use crate::ConsensusError;
use hotstuff_types::{HotstuffMessage, HotstuffStep, QuorumCertificate};
use tracing::{debug, error, info, warn};

pub(crate) struct LeaderHandler;

impl StepHandler for LeaderHandler {
    fn on_new_round(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        if !core.leader_ingest(msg)? {
            return Ok(());
        }
        if !core.has_new_round_quorum() {
            return Ok(());
        }
        core.propose_block()
    }

    fn on_prepare(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        if core.leader_ingest(msg)? {
            core.try_certify(HotstuffStep::Prepare)?;
        }
        Ok(())
    }

    fn on_pre_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        if core.leader_ingest(msg)? {
            core.try_certify(HotstuffStep::PreCommit)?;
        }
        Ok(())
    }

    fn on_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        if core.leader_ingest(msg)? {
            core.try_certify(HotstuffStep::Commit)?;
        }
        Ok(())
    }

    fn on_decide(&self, _core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        debug!(height = msg.height, round = msg.round, "Leader ignores Decide messages");
        Ok(())
    }
}

impl ConsensusCore {
    /// Validate a message and index it into the pool.
    ///
    /// Returns false for a vote that is already pooled.
    fn leader_ingest(&mut self, msg: HotstuffMessage) -> Result<bool, ConsensusError> {
        validate_basic(self, &msg)?;
        if msg.is_vote() && self.mempool.contains(&msg)? {
            debug!(height = msg.height, round = msg.round, step = %msg.step, "Duplicate vote");
            return Ok(false);
        }
        self.mempool.push(msg)?;
        Ok(true)
    }

    fn has_new_round_quorum(&self) -> bool {
        let (height, round) = (self.state.height, self.state.round);
        let count = self
            .mempool
            .get(HotstuffStep::NewRound)
            .iter()
            .filter(|m| m.height == height && m.round == round)
            .count();
        let quorum = self.state.validators.is_quorum(count);
        if !quorum {
            debug!(
                node = %self.state.node_id,
                height,
                round,
                count,
                needed = self.state.validators.quorum_size(),
                "Waiting for NewRound quorum"
            );
        }
        quorum
    }

    /// Highest valid certificate offered by pooled NewRound messages or held
    /// as this node's lock.
    fn find_high_qc(&self) -> Option<QuorumCertificate> {
        let offered = self
            .mempool
            .get(HotstuffStep::NewRound)
            .iter()
            .filter_map(HotstuffMessage::quorum_certificate)
            .filter(|qc| match quorum::validate_qc(Some(*qc), &self.state.validators) {
                Ok(_) => true,
                Err(e) => {
                    warn!(height = qc.height, round = qc.round, error = %e, "Ignoring invalid NewRound certificate");
                    false
                }
            });
        offered
            .chain(self.state.locked_qc.as_ref())
            .max_by_key(|qc| (qc.height, qc.round))
            .cloned()
    }

    /// A certificate from an earlier height says nothing about this one.
    fn should_prepare_new_block(&self, high_qc: Option<&QuorumCertificate>) -> bool {
        match high_qc {
            None => true,
            Some(qc) => qc.block.is_none() || qc.height < self.state.height,
        }
    }

    /// NewRound quorum reached: pick or build the block and propose it.
    fn propose_block(&mut self) -> Result<(), ConsensusError> {
        let (height, round) = (self.state.height, self.state.round);
        if let Err(e) = self.refresh_execution_context() {
            error!(height, round, error = %e, "Failed to open execution context");
            return Err(e);
        }

        let high_qc = self.find_high_qc();
        let proposal = if self.should_prepare_new_block(high_qc.as_ref()) {
            self.prepare_block().map(|block| (block, None))
        } else {
            // Checked by should_prepare_new_block.
            let qc = high_qc.ok_or(QcError::Missing)?;
            let block = qc.block.clone().ok_or(QcError::MissingBlock)?;
            info!(
                height,
                round,
                qc_round = qc.round,
                block_hash = ?block.hash(),
                "Re-proposing certified block"
            );
            self.apply_block(&block).map(|()| (block, Some(qc)))
        };
        let (block, justify) = match proposal {
            Ok(proposal) => proposal,
            Err(e) => {
                error!(height, round, error = %e, "Failed to prepare block");
                self.interrupt_round("failed to prepare block");
                return Err(e);
            }
        };

        info!(
            node = %self.state.node_id,
            height,
            round,
            block_hash = ?block.hash(),
            txs = block.transactions.len(),
            justified = justify.is_some(),
            "Proposing block"
        );

        self.state.block = Some(block.clone());
        self.state.step = HotstuffStep::Prepare;
        self.mempool.clear(HotstuffStep::NewRound);

        let message = match HotstuffMessage::propose(height, round, HotstuffStep::Prepare, Some(block), justify) {
            Ok(message) => message,
            Err(e) => {
                self.interrupt_round("failed to build proposal");
                return Err(e.into());
            }
        };
        self.actions.push(hotstuff_core::Action::Broadcast { message });
        self.self_vote(HotstuffStep::Prepare)
    }

    /// Pool the leader's own vote for `step`, then check for a quorum.
    fn self_vote(&mut self, step: HotstuffStep) -> Result<(), ConsensusError> {
        let Some(block) = self.state.block.as_ref() else {
            warn!(%step, "No block to vote for");
            return Ok(());
        };
        let vote = HotstuffMessage::vote(self.state.height, self.state.round, step, block, &self.signing_key)?;
        self.mempool.push(vote)?;
        self.try_certify(step)
    }

    /// Form a certificate for `step` from pooled votes and advance.
    fn try_certify(&mut self, step: HotstuffStep) -> Result<(), ConsensusError> {
        if self.state.step != step {
            return Ok(());
        }
        let (height, round) = (self.state.height, self.state.round);
        let Some(block) = self.state.block.clone() else {
            warn!(height, round, %step, "Votes arrived with no block proposed");
            return Ok(());
        };

        let qc = match quorum::build_qc(
            height,
            round,
            step,
            &block,
            self.mempool.get(step).iter(),
            &self.state.validators,
        ) {
            Ok(qc) => qc,
            Err(QcError::ThresholdNotMet { valid, .. }) => {
                debug!(height, round, %step, valid, "Waiting for votes");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let next = match step {
            HotstuffStep::Prepare => {
                self.state.prepare_qc = Some(qc.clone());
                HotstuffStep::PreCommit
            }
            HotstuffStep::PreCommit => {
                self.state.locked_qc = Some(qc.clone());
                HotstuffStep::Commit
            }
            HotstuffStep::Commit => HotstuffStep::Decide,
            HotstuffStep::NewRound | HotstuffStep::Decide => return Ok(()),
        };
        debug!(
            node = %self.state.node_id,
            height,
            round,
            %step,
            signers = qc.signer_count(),
            "Formed quorum certificate"
        );
        self.state.step = next;
        self.mempool.clear(step);

        let message = match HotstuffMessage::propose(height, round, next, Some(block.clone()), Some(qc.clone())) {
            Ok(message) => message,
            Err(e) => {
                self.interrupt_round("failed to build proposal");
                return Err(e.into());
            }
        };
        self.actions.push(hotstuff_core::Action::Broadcast { message });

        if next != HotstuffStep::Decide {
            return self.self_vote(next);
        }

        let committed = with_quorum_certificate(block, &qc).and_then(|block| self.commit_block(block));
        if let Err(e) = committed {
            error!(height, round, error = %e, "Failed to commit block");
            self.interrupt_round("commit failed");
            return Err(e);
        }
        self.advance_height();
        Ok(())
    }
}
