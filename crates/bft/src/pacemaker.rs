//! Pacemaker: view synchronization, round timeouts and view changes.
//!
//! # Message admission
//!
//! Every incoming message is checked against the local view before any
//! handler sees it:
//!
//! ```text
//! stale height        → reject
//! future height       → reject, report the node as unsynced
//! own proposal echo   → reject (leader, Propose, step ≠ NewRound)
//! past (round, step)  → reject
//! current view        → accept
//! later view          → catch up: adopt the message's round and step
//! ```
//!
//! # View changes
//!
//! Entering a view clears the round state, releases the execution context,
//! re-arms the round timer and broadcasts a NewRound message. In manual mode
//! the broadcast is held until an operator forces the view change.

use crate::ConsensusState;
use hotstuff_core::{Action, RoundTimer, TimerTicket};
use hotstuff_mempool::MessagePool;
use hotstuff_types::{HotstuffMessage, HotstuffStep, QuorumCertificate};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PacemakerError {
    #[error(
        "unexpected message at ({height}, {round}, {step}) while at ({local_height}, {local_round}, {local_step})"
    )]
    UnexpectedCase {
        height: u64,
        round: u64,
        step: HotstuffStep,
        local_height: u64,
        local_round: u64,
        local_step: HotstuffStep,
    },
}

/// Why the pacemaker dropped a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    StaleHeight,
    FutureHeight,
    OwnProposal,
    PastView,
}

/// Outcome of [`Pacemaker::should_handle_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The message belongs to the current view.
    Accept,
    /// The node jumped forward to the message's round and step.
    CatchUp { elect_leader: bool },
    Reject(RejectReason),
}

// ═══════════════════════════════════════════════════════════════════════════
// View-change broadcast policy
// ═══════════════════════════════════════════════════════════════════════════

/// What to do with the NewRound message of a view change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewChangeBroadcast {
    Send(Option<QuorumCertificate>),
    Hold,
}

/// Decides whether a view change broadcasts immediately.
pub trait ViewChangeBroadcastPolicy: Send + std::fmt::Debug {
    fn on_view_change(&mut self, qc: Option<QuorumCertificate>, forced: bool) -> ViewChangeBroadcast;

    /// Certificate held back by an unforced view change, if any.
    fn take_held(&mut self) -> Option<QuorumCertificate>;

    fn is_manual(&self) -> bool;
}

/// Broadcast on every view change.
#[derive(Debug, Default)]
pub struct AutomaticViewChange;

impl ViewChangeBroadcastPolicy for AutomaticViewChange {
    fn on_view_change(&mut self, qc: Option<QuorumCertificate>, _forced: bool) -> ViewChangeBroadcast {
        ViewChangeBroadcast::Send(qc)
    }

    fn take_held(&mut self) -> Option<QuorumCertificate> {
        None
    }

    fn is_manual(&self) -> bool {
        false
    }
}

/// Hold the NewRound broadcast until forced.
#[derive(Debug, Default)]
pub struct ManualViewChange {
    held: Option<QuorumCertificate>,
}

impl ViewChangeBroadcastPolicy for ManualViewChange {
    fn on_view_change(&mut self, qc: Option<QuorumCertificate>, forced: bool) -> ViewChangeBroadcast {
        if forced {
            self.held = None;
            ViewChangeBroadcast::Send(qc)
        } else {
            self.held = qc;
            ViewChangeBroadcast::Hold
        }
    }

    fn take_held(&mut self) -> Option<QuorumCertificate> {
        self.held.take()
    }

    fn is_manual(&self) -> bool {
        true
    }
}

fn policy_for(manual: bool) -> Box<dyn ViewChangeBroadcastPolicy> {
    if manual {
        Box::<ManualViewChange>::default()
    } else {
        Box::new(AutomaticViewChange)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Pacemaker
// ═══════════════════════════════════════════════════════════════════════════

pub struct Pacemaker {
    timeout: Duration,
    timer: Box<dyn RoundTimer>,
    generation: u64,
    policy: Box<dyn ViewChangeBroadcastPolicy>,
}

impl std::fmt::Debug for Pacemaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacemaker")
            .field("timeout", &self.timeout)
            .field("generation", &self.generation)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Pacemaker {
    pub fn new(timeout: Duration, manual: bool, timer: Box<dyn RoundTimer>) -> Self {
        Self {
            timeout,
            timer,
            generation: 0,
            policy: policy_for(manual),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_manual_mode(&self) -> bool {
        self.policy.is_manual()
    }

    /// Switch the broadcast policy. A held certificate is dropped.
    pub fn set_manual_mode(&mut self, manual: bool) {
        if manual != self.is_manual_mode() {
            info!(manual, "Switching pacemaker mode");
            self.policy = policy_for(manual);
        }
    }

    /// Decide whether `msg` should reach the step handlers.
    ///
    /// May move the node forward (catch-up) or record an unsynced report.
    pub fn should_handle_message(
        &self,
        state: &mut ConsensusState,
        msg: &HotstuffMessage,
        actions: &mut Vec<Action>,
    ) -> Result<Verdict, PacemakerError> {
        let (height, round, step) = (state.height, state.round, state.step);

        if msg.height < height {
            trace!(msg_height = msg.height, height, "Discarding message from a past height");
            return Ok(Verdict::Reject(RejectReason::StaleHeight));
        }

        if msg.height > height {
            debug!(
                node = %state.node_id,
                msg_height = msg.height,
                height,
                "Message from a future height, node is behind"
            );
            actions.push(Action::Unsynced {
                local_height: height,
                observed_height: msg.height,
            });
            return Ok(Verdict::Reject(RejectReason::FutureHeight));
        }

        if state.is_leader() && msg.is_propose() && msg.step != HotstuffStep::NewRound {
            return Ok(Verdict::Reject(RejectReason::OwnProposal));
        }

        if msg.round < round || (msg.round == round && msg.step < step) {
            trace!(
                msg_round = msg.round,
                msg_step = %msg.step,
                round,
                %step,
                "Discarding message from a past view"
            );
            return Ok(Verdict::Reject(RejectReason::PastView));
        }

        if msg.round == round && msg.step == step {
            return Ok(Verdict::Accept);
        }

        if msg.round > round || msg.step > step {
            let round_changed = msg.round != round;
            info!(
                node = %state.node_id,
                height,
                from_round = round,
                from_step = %step,
                to_round = msg.round,
                to_step = %msg.step,
                "Catching up to a later view"
            );
            state.round = msg.round;
            state.step = msg.step;
            return Ok(Verdict::CatchUp {
                elect_leader: round_changed || state.leader_id.is_none(),
            });
        }

        Err(PacemakerError::UnexpectedCase {
            height: msg.height,
            round: msg.round,
            step: msg.step,
            local_height: height,
            local_round: round,
            local_step: step,
        })
    }

    /// Re-arm the round timer for the current view.
    pub fn restart_timer(&mut self, state: &ConsensusState) {
        self.generation += 1;
        let ticket = TimerTicket {
            height: state.height,
            round: state.round,
            generation: self.generation,
        };
        trace!(height = ticket.height, round = ticket.round, generation = ticket.generation, "Arming round timer");
        self.timer.arm(ticket, self.timeout);
    }

    pub fn cancel_timer(&mut self) {
        self.timer.cancel();
    }

    /// Whether `ticket` belongs to the most recent arming.
    pub fn is_current(&self, ticket: TimerTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Enter a fresh view at the current height and round.
    pub fn start_next_view(
        &mut self,
        state: &mut ConsensusState,
        mempool: &mut MessagePool,
        qc: Option<QuorumCertificate>,
        forced: bool,
        actions: &mut Vec<Action>,
    ) {
        state.reset_round();
        mempool.clear_all();
        state.release_execution();

        match self.policy.on_view_change(qc, forced) {
            ViewChangeBroadcast::Send(qc) => {
                debug!(
                    node = %state.node_id,
                    height = state.height,
                    round = state.round,
                    has_qc = qc.is_some(),
                    "Broadcasting NewRound"
                );
                actions.push(Action::Broadcast {
                    message: HotstuffMessage::new_round(state.height, state.round, qc),
                });
            }
            ViewChangeBroadcast::Hold => {
                debug!(
                    node = %state.node_id,
                    height = state.height,
                    round = state.round,
                    "Manual mode, holding NewRound broadcast"
                );
            }
        }

        self.restart_timer(state);
    }

    /// Move to the next round of the current height.
    ///
    /// The NewRound message carries the highest certificate this node holds
    /// for the height: its Prepare QC, or its lock when it has none.
    pub fn interrupt_round(
        &mut self,
        state: &mut ConsensusState,
        mempool: &mut MessagePool,
        reason: &str,
        actions: &mut Vec<Action>,
    ) {
        info!(
            node = %state.node_id,
            height = state.height,
            round = state.round,
            step = %state.step,
            reason,
            "Interrupting round"
        );
        state.round += 1;
        let qc = state.prepare_qc.take().or_else(|| state.locked_qc.clone());
        self.start_next_view(state, mempool, qc, false, actions);
    }

    /// Move to round 0 of the next height.
    pub fn new_height(
        &mut self,
        state: &mut ConsensusState,
        mempool: &mut MessagePool,
        actions: &mut Vec<Action>,
    ) {
        state.height += 1;
        state.round = 0;
        state.locked_qc = None;
        state.prepare_qc = None;
        info!(node = %state.node_id, height = state.height, "Starting new height");
        self.start_next_view(state, mempool, None, false, actions);
    }

    /// Release a held view change.
    pub fn force_next_view(
        &mut self,
        state: &mut ConsensusState,
        mempool: &mut MessagePool,
        actions: &mut Vec<Action>,
    ) {
        let qc = self.policy.take_held();
        self.start_next_view(state, mempool, qc, true, actions);
    }
}
