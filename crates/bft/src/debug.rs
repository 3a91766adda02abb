//! Debug and control commands.

use crate::engine::ConsensusCore;
use crate::ConsensusError;
use hotstuff_core::{Action, DebugCommand};
use hotstuff_types::{Hash, HotstuffStep};
use tracing::info;

impl ConsensusCore {
    pub(crate) fn handle_debug_command(&mut self, command: DebugCommand) -> Result<(), ConsensusError> {
        info!(node = %self.state.node_id, ?command, "Debug command");
        match command {
            DebugCommand::TriggerNextView => self.trigger_next_view(),
            DebugCommand::ResetToGenesis => self.reset_to_genesis(),
            DebugCommand::TogglePacemakerManualMode => {
                let manual = !self.pacemaker.is_manual_mode();
                self.pacemaker.set_manual_mode(manual);
            }
            DebugCommand::RequestMetadata => self.actions.push(Action::RequestMetadata),
            DebugCommand::RequestBlock { height } => self.actions.push(Action::RequestBlock { height }),
        }
        Ok(())
    }

    /// Start the next height when idle or decided, otherwise abandon the
    /// round. In manual mode the held NewRound is released, and a node
    /// already waiting in NewRound keeps its round.
    fn trigger_next_view(&mut self) {
        let manual = self.pacemaker.is_manual_mode();
        let step = self.state.step;
        if self.state.height == 0 || (manual && step == HotstuffStep::Decide) {
            self.advance_height();
        } else if !(manual && step == HotstuffStep::NewRound) {
            self.interrupt_round("manual trigger");
        }
        if manual {
            self.force_next_view();
        }
    }

    fn reset_to_genesis(&mut self) {
        self.pacemaker.cancel_timer();
        self.state.height = 0;
        self.state.round = 0;
        self.state.reset_round();
        self.state.locked_qc = None;
        self.state.last_block_hash = Hash::ZERO;
        self.mempool.clear_all();
        self.release_execution_context();
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::harness;
    use hotstuff_core::DebugCommand;
    use hotstuff_types::HotstuffStep;

    #[test]
    fn test_trigger_from_genesis_starts_height_one() {
        let h = harness(4, 0);
        assert_eq!(h.engine.height(), 0);
        h.engine.handle_debug_command(DebugCommand::TriggerNextView).unwrap();

        assert_eq!((h.engine.height(), h.engine.round(), h.engine.step()), (1, 0, HotstuffStep::NewRound));
        let broadcasts = h.network.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!((broadcasts[0].height, broadcasts[0].step), (1, HotstuffStep::NewRound));
    }

    #[test]
    fn test_trigger_mid_round_interrupts() {
        let h = harness(4, 0);
        h.engine.set_height(3);
        h.engine.set_step(HotstuffStep::PreCommit);
        h.engine.handle_debug_command(DebugCommand::TriggerNextView).unwrap();
        assert_eq!((h.engine.height(), h.engine.round(), h.engine.step()), (3, 1, HotstuffStep::NewRound));
        assert_eq!(h.network.broadcasts().len(), 1);
    }

    #[test]
    fn test_trigger_in_new_round_releases_without_interrupting() {
        let h = harness(4, 0);
        h.engine.set_height(2);
        h.engine.handle_debug_command(DebugCommand::TriggerNextView).unwrap();
        assert_eq!((h.engine.height(), h.engine.round(), h.engine.step()), (2, 0, HotstuffStep::NewRound));
        let broadcasts = h.network.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!((broadcasts[0].height, broadcasts[0].round), (2, 0));
    }

    #[test]
    fn test_toggle_and_reset() {
        let h = harness(4, 0);
        assert!(h.engine.is_manual_mode());
        h.engine.handle_debug_command(DebugCommand::TogglePacemakerManualMode).unwrap();
        assert!(!h.engine.is_manual_mode());

        h.engine.set_height(7);
        h.engine.set_round(2);
        h.engine.handle_debug_command(DebugCommand::ResetToGenesis).unwrap();
        let state = h.engine.node_state();
        assert_eq!((state.height, state.round, state.step), (0, 0, HotstuffStep::NewRound));
        assert_eq!(state.leader_id, None);
    }

    #[test]
    fn test_sync_requests_reach_state_sync() {
        let h = harness(4, 0);
        h.engine.handle_debug_command(DebugCommand::RequestMetadata).unwrap();
        h.engine.handle_debug_command(DebugCommand::RequestBlock { height: 9 }).unwrap();
        assert_eq!(h.state_sync.requests(), vec![None, Some(9)]);
    }
}
