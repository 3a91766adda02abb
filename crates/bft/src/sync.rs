//! Committing blocks delivered by state sync.

use crate::engine::ConsensusCore;
use crate::{quorum, ConsensusError, SyncError};
use hotstuff_types::{codec, Block, HotstuffStep};
use tracing::{debug, info, warn};

impl ConsensusCore {
    /// Commit a block a peer already decided, if it is the next one this
    /// node needs.
    ///
    /// The embedded commit certificate must verify against the current
    /// validator set and certify exactly this block.
    pub(crate) fn handle_synced_block(&mut self, block: Block) -> Result<(), ConsensusError> {
        let height = block.height();
        let persisted = self
            .persistence
            .new_read_context(height)?
            .get_maximum_block_height()?;
        if height <= persisted {
            debug!(height, persisted, "Synced block already persisted");
            return Ok(());
        }
        if height != self.state.height {
            debug!(height, current = self.state.height, "Synced block is not for the current height");
            return Ok(());
        }
        if !block.has_quorum_certificate() {
            return Err(SyncError::MissingQuorumCertificate { height }.into());
        }

        let qc = codec::decode_quorum_certificate(&block.header.quorum_certificate)
            .map_err(SyncError::from)?;
        quorum::validate_qc(Some(&qc), &self.state.validators).map_err(SyncError::from)?;
        if qc.height != height
            || qc.step != HotstuffStep::Commit
            || qc.block_hash() != Some(block.hash())
        {
            return Err(SyncError::CertificateMismatch { height }.into());
        }

        info!(
            node = %self.state.node_id,
            height,
            round = qc.round,
            block_hash = ?block.hash(),
            "Applying synced block"
        );
        if let Err(e) = self.apply_and_commit(block) {
            warn!(height, error = %e, "Synced block failed");
            self.release_execution_context();
            self.interrupt_round("synced block failed");
            return Err(e);
        }
        self.advance_height();
        Ok(())
    }

    /// Round and leader are left alone; a failure here must not move the
    /// node back into a view it already passed.
    fn apply_and_commit(&mut self, block: Block) -> Result<(), ConsensusError> {
        self.refresh_execution_context()?;
        self.apply_block(&block)?;
        self.state.block = Some(block.clone());
        self.commit_block(block)
    }
}
