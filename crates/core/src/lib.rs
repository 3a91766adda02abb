//! Core types for the HotStuff consensus node.
//!
//! This crate defines the seams between the consensus state machine and the
//! outside world:
//!
//! - [`Action`]: effects the engine records while holding its lock
//! - [`Event`]: inputs a runner feeds into the engine
//! - Collaborator traits: [`Persistence`], [`Network`], [`Utility`],
//!   [`StateSync`] and the pacemaker's [`RoundTimer`]
//!
//! # Architecture
//!
//! ```text
//! Events → ConsensusEngine (locked state) → Actions → collaborators
//! ```
//!
//! Actions are dispatched only after the engine lock is released, so a
//! collaborator that delivers straight back into the engine cannot deadlock.

mod action;
mod event;
mod traits;

pub use action::Action;
pub use event::Event;
pub use traits::{
    ExecutionContext, Network, NetworkError, Persistence, PersistenceError, ReadContext,
    RoundTimer, StateSync, Utility, UtilityError,
};

use hotstuff_types::{Block, HotstuffStep, NodeId};

/// Identifies one arming of the round timer.
///
/// The generation increases on every restart, so an expiry that raced a
/// newer restart is recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerTicket {
    pub height: u64,
    pub round: u64,
    pub generation: u64,
}

/// Published to state sync after every successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockCommittedEvent {
    pub height: u64,
    pub block: Block,
}

/// Commands from the debug/control surface.
///
/// Used by test harnesses and operational tooling, never by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    /// Advance the view: start a new height or interrupt the round.
    TriggerNextView,
    /// Drop all consensus state back to height 0.
    ResetToGenesis,
    /// Flip the pacemaker between automatic and manual view changes.
    TogglePacemakerManualMode,
    /// Ask state sync for peer metadata.
    RequestMetadata,
    /// Ask state sync for the block at a height.
    RequestBlock { height: u64 },
}

/// Snapshot of a node's consensus position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusNodeState {
    pub node_id: NodeId,
    pub height: u64,
    pub round: u64,
    pub step: HotstuffStep,
    pub is_leader: bool,
    pub leader_id: Option<NodeId>,
}
