//! Event types delivered to a running node.

use crate::{DebugCommand, TimerTicket};
use hotstuff_types::{Block, HotstuffMessage};

/// Inputs a node runner feeds into the engine.
#[derive(Debug, Clone)]
pub enum Event {
    /// Encoded message bytes received from the network.
    MessageReceived { data: Vec<u8> },

    /// An already-decoded message (in-process transports).
    Message(HotstuffMessage),

    /// The pacemaker's round timer expired.
    RoundTimeout(TimerTicket),

    /// Control-surface command.
    Debug(DebugCommand),

    /// A committed block delivered by state sync.
    SyncedBlock(Block),

    /// Stop the runner.
    Shutdown,
}

impl Event {
    /// Short name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::MessageReceived { .. } => "MessageReceived",
            Event::Message(_) => "Message",
            Event::RoundTimeout(_) => "RoundTimeout",
            Event::Debug(_) => "Debug",
            Event::SyncedBlock(_) => "SyncedBlock",
            Event::Shutdown => "Shutdown",
        }
    }
}
