//! Tokio event loop driving one consensus engine.
//!
//! A single task owns the loop and feeds every input into the engine:
//!
//! ```text
//!   network ──► event channel ──┐
//!   control ──►                 ├──► NodeRunner::run ──► ConsensusEngine
//!   timer   ──► timer channel ──┘
//! ```
//!
//! Timer expiries have their own channel and are polled first, so a flood
//! of network traffic can never starve the pacemaker.

use crate::timers::TokioRoundTimer;
use crate::DEFAULT_CHANNEL_CAPACITY;
use hotstuff_bft::{Collaborators, ConsensusConfig, ConsensusEngine, ConsensusError};
use hotstuff_core::Event;
use hotstuff_types::KeyPair;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, instrument, warn};

/// Capacity of the dedicated timer channel. One live timer at a time, so
/// this only absorbs expiries racing a restart.
const TIMER_CHANNEL_CAPACITY: usize = 16;

/// Errors from the node runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

/// Handle for stopping a running node. Dropping it also stops the node.
pub struct ShutdownHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl ShutdownHandle {
    pub fn shutdown(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ShutdownHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Sends inputs to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    event_tx: mpsc::Sender<Event>,
    engine: Arc<ConsensusEngine>,
}

impl NodeHandle {
    pub async fn send(&self, event: Event) -> Result<(), RunnerError> {
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }
}

/// Drives one validator's engine from a tokio task.
pub struct NodeRunner {
    engine: Arc<ConsensusEngine>,
    event_tx: mpsc::Sender<Event>,
    event_rx: mpsc::Receiver<Event>,
    timer_rx: mpsc::Receiver<Event>,
    shutdown_rx: oneshot::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl NodeRunner {
    /// Build the engine with a tokio round timer and an event channel of
    /// `channel_capacity`.
    pub fn new(
        config: ConsensusConfig,
        signing_key: KeyPair,
        collaborators: Collaborators,
        channel_capacity: usize,
    ) -> Result<Self, RunnerError> {
        let (event_tx, event_rx) = mpsc::channel(channel_capacity.max(1));
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let timer = TokioRoundTimer::new(timer_tx);
        let engine = ConsensusEngine::new(config, signing_key, collaborators, Box::new(timer))?;

        Ok(Self {
            engine: Arc::new(engine),
            event_tx,
            event_rx,
            timer_rx,
            shutdown_rx,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn with_default_capacity(
        config: ConsensusConfig,
        signing_key: KeyPair,
        collaborators: Collaborators,
    ) -> Result<Self, RunnerError> {
        Self::new(config, signing_key, collaborators, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Sender for the inbound event channel. Transports register this.
    pub fn event_sender(&self) -> mpsc::Sender<Event> {
        self.event_tx.clone()
    }

    pub fn engine(&self) -> &Arc<ConsensusEngine> {
        &self.engine
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            event_tx: self.event_tx.clone(),
            engine: self.engine.clone(),
        }
    }

    /// Take the shutdown handle. Only the first call returns it.
    pub fn shutdown_handle(&mut self) -> Option<ShutdownHandle> {
        self.shutdown_tx.take().map(|tx| ShutdownHandle { tx: Some(tx) })
    }

    /// Start the engine and process events until shutdown.
    pub async fn run(mut self) -> Result<(), RunnerError> {
        info!(
            node = %self.engine.node_id(),
            height = self.engine.height(),
            manual = self.engine.is_manual_mode(),
            "Starting node runner"
        );
        self.engine.start();

        loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown_rx => {
                    info!("Shutdown signal received");
                    break;
                }

                Some(event) = self.timer_rx.recv() => self.handle_event(event),

                event = self.event_rx.recv() => match event {
                    Some(Event::Shutdown) => {
                        info!("Shutdown event received");
                        break;
                    }
                    Some(event) => self.handle_event(event),
                    // Unreachable while the runner holds its own sender.
                    None => return Err(RunnerError::ChannelClosed),
                },
            }
        }

        info!(node = %self.engine.node_id(), height = self.engine.height(), "Node runner stopped");
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(event = event.type_name()))]
    fn handle_event(&self, event: Event) {
        let event_type = event.type_name();
        let result = match event {
            Event::MessageReceived { data } => self.engine.handle_message_bytes(&data),
            Event::Message(message) => self.engine.handle_message(message),
            Event::RoundTimeout(ticket) => {
                self.engine.on_round_timeout(ticket);
                Ok(())
            }
            Event::Debug(command) => self.engine.handle_debug_command(command),
            Event::SyncedBlock(block) => self.engine.handle_synced_block(block),
            Event::Shutdown => Ok(()),
        };
        if let Err(e) = result {
            warn!(node = %self.engine.node_id(), event = event_type, error = %e, "Event handling failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotstuff_core::DebugCommand;
    use hotstuff_simulation::{SimStateSync, SimStorage, SimUtility};
    use hotstuff_types::test_utils::test_key_pair;
    use hotstuff_types::ValidatorInfo;
    use std::time::Duration;
    use tracing_test::traced_test;

    struct Null;

    impl hotstuff_core::Network for Null {
        fn send(
            &self,
            _to: &hotstuff_types::Address,
            _message: hotstuff_types::HotstuffMessage,
        ) -> Result<(), hotstuff_core::NetworkError> {
            Ok(())
        }

        fn broadcast(&self, _message: hotstuff_types::HotstuffMessage) -> Result<(), hotstuff_core::NetworkError> {
            Ok(())
        }
    }

    fn runner(manual: bool) -> NodeRunner {
        let key = test_key_pair(1);
        let storage = Arc::new(SimStorage::new(vec![ValidatorInfo::from_public_key(key.public_key(), 1)]));
        let collaborators = Collaborators {
            persistence: storage.clone(),
            network: Arc::new(Null),
            utility: Arc::new(SimUtility::new(storage)),
            state_sync: Arc::new(SimStateSync::default()),
        };
        let config = ConsensusConfig::for_testing().with_manual_mode(manual);
        NodeRunner::new(config, key, collaborators, 16).unwrap()
    }

    #[traced_test]
    #[tokio::test]
    async fn test_shutdown_handle_stops_the_loop() {
        let mut runner = runner(true);
        let shutdown = runner.shutdown_handle().unwrap();
        assert!(runner.shutdown_handle().is_none());

        let task = tokio::spawn(runner.run());
        shutdown.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_events_reach_the_engine() {
        let runner = runner(true);
        let handle = runner.handle();
        let task = tokio::spawn(runner.run());

        handle.send(Event::Debug(DebugCommand::TogglePacemakerManualMode)).await.unwrap();
        handle.send(Event::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!handle.engine().is_manual_mode());
        assert!(matches!(handle.send(Event::Shutdown).await, Err(RunnerError::ChannelClosed)));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_bad_input_does_not_stop_the_loop() {
        let runner = runner(true);
        let handle = runner.handle();
        let task = tokio::spawn(runner.run());

        handle.send(Event::MessageReceived { data: vec![0xff; 3] }).await.unwrap();
        handle.send(Event::Debug(DebugCommand::TogglePacemakerManualMode)).await.unwrap();
        handle.send(Event::Shutdown).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!handle.engine().is_manual_mode());
    }
}
