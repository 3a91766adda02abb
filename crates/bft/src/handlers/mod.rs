//! Role-specific step handlers.
//!
//! A node is either the leader of the current view or a replica. The role is
//! chosen once per message; each role implements the same five step
//! handlers.

mod leader;
mod replica;

use crate::engine::ConsensusCore;
use crate::{ConsensusError, ValidationError};
use hotstuff_types::{HotstuffMessage, HotstuffStep};
use tracing::warn;

use leader::LeaderHandler;
use replica::ReplicaHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Replica,
}

impl Role {
    pub(crate) fn handler(self) -> &'static dyn StepHandler {
        match self {
            Role::Leader => &LeaderHandler,
            Role::Replica => &ReplicaHandler,
        }
    }
}

pub(crate) trait StepHandler: Sync {
    fn on_new_round(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError>;

    fn on_prepare(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError>;

    fn on_pre_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError>;

    fn on_commit(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError>;

    fn on_decide(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError>;

    /// Route by step. Invalid messages are logged and dropped.
    fn dispatch(&self, core: &mut ConsensusCore, msg: HotstuffMessage) -> Result<(), ConsensusError> {
        let step = msg.step;
        let result = match step {
            HotstuffStep::NewRound => self.on_new_round(core, msg),
            HotstuffStep::Prepare => self.on_prepare(core, msg),
            HotstuffStep::PreCommit => self.on_pre_commit(core, msg),
            HotstuffStep::Commit => self.on_commit(core, msg),
            HotstuffStep::Decide => self.on_decide(core, msg),
        };
        match result {
            Err(ConsensusError::Validation(e)) => {
                warn!(node = %core.state.node_id, %step, error = %e, "Discarding invalid message");
                Ok(())
            }
            other => other,
        }
    }
}

/// Checks every message passes before a handler acts on it.
pub(crate) fn validate_basic(core: &ConsensusCore, msg: &HotstuffMessage) -> Result<(), ValidationError> {
    crate::validation::validate_block_basic(msg, core.config.max_block_bytes)?;
    crate::validation::validate_partial_signature(msg, &core.state.validators)
}
