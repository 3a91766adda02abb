//! HotStuff BFT consensus state machine.
//!
//! This crate implements the basic (non-chained) HotStuff protocol for one
//! validator. It is synchronous: every input runs to completion under the
//! engine lock, and all I/O leaves through the collaborator traits of
//! `hotstuff-core` after the lock is released.
//!
//! # Architecture
//!
//! ```text
//!                   ┌────────────────────────────┐
//!  messages ──────► │ Pacemaker                  │  admission, catch-up,
//!  timeouts ──────► │   should_handle_message    │  timers, view changes
//!                   └─────────────┬──────────────┘
//!                                 ▼
//!                   ┌────────────────────────────┐
//!                   │ Role::{Leader, Replica}    │  five step handlers each
//!                   └─────────────┬──────────────┘
//!                                 ▼
//!                     Actions → Network / StateSync
//! ```
//!
//! # Protocol
//!
//! Each round of a height walks `NewRound → Prepare → PreCommit → Commit →
//! Decide`:
//!
//! - **NewRound**: every node sends the leader its highest certificate. With
//!   a quorum of NewRound messages the leader proposes either the block of
//!   the highest certificate or a fresh block.
//! - **Prepare / PreCommit / Commit**: replicas vote; the leader aggregates
//!   a quorum of votes into a [`QuorumCertificate`](hotstuff_types::QuorumCertificate)
//!   and broadcasts it with the next step's proposal. The PreCommit
//!   certificate locks the block.
//! - **Decide**: the Commit certificate is embedded in the block header and
//!   the block is committed. The node moves to the next height.
//!
//! # Safety
//!
//! A locked node only votes for a proposal whose justification certifies the
//! proposed block and either extends the locked block or was formed in a
//! later view. Quorums are strictly more than two thirds of the validator
//! set, so two conflicting certificates can never form in the same view.
//!
//! # Liveness
//!
//! The round timer interrupts a round that makes no progress. The next NewRound
//! message carries the node's Prepare certificate or, failing that, its lock,
//! so the next leader can re-propose a locked block.

mod config;
mod debug;
mod election;
mod engine;
mod error;
mod handlers;
mod pacemaker;
pub mod quorum;
mod state;
mod sync;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::{
    ConsensusConfig, PacemakerConfig, DEFAULT_MAX_BLOCK_BYTES, DEFAULT_ROUND_TIMEOUT_MS, VOTE_OVERHEAD_BYTES,
};
pub use election::{LeaderElection, LeaderElectionError, RoundRobin, StakeWeighted};
pub use engine::{Collaborators, ConsensusEngine};
pub use error::{CommitError, ConsensusError, SyncError};
pub use handlers::Role;
pub use pacemaker::{
    AutomaticViewChange, ManualViewChange, Pacemaker, PacemakerError, RejectReason, Verdict,
    ViewChangeBroadcast, ViewChangeBroadcastPolicy,
};
pub use quorum::QcError;
pub use state::ConsensusState;
pub use validation::ValidationError;
