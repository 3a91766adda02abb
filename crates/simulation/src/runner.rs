//! Deterministic simulation runner.
//!
//! Each node has its own storage, execution engine and state-sync recorder.
//! Messages travel encoded through a shared outbox and are delivered one at
//! a time, oldest first or in seeded random order. Round timers fire only
//! when the test says so.

use crate::network::{DropReason, Envelope, NetworkConfig, Outbox, SimNetworkPort, SimulatedNetwork};
use crate::{NodeIndex, SimStateSync, SimStorage, SimTimer, SimUtility};
use hotstuff_bft::{Collaborators, ConsensusConfig, ConsensusEngine, ConsensusError};
use hotstuff_core::{ConsensusNodeState, DebugCommand};
use hotstuff_types::{
    codec, Address, Block, Hash, HotstuffMessage, KeyPair, Transaction, ValidatorInfo,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub num_validators: u32,
    pub seed: u64,
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_validators: 4,
            seed: 42,
            consensus: ConsensusConfig::for_testing(),
            network: NetworkConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_validators(mut self, n: u32) -> Self {
        self.num_validators = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_consensus(mut self, consensus: ConsensusConfig) -> Self {
        self.consensus = consensus;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    /// Messages scheduled for delivery.
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_dropped_partition: u64,
    pub messages_dropped_loss: u64,
    /// Messages addressed to a crashed node.
    pub messages_dropped_crashed: u64,
    pub timeouts_fired: u64,
    /// Inputs the engine returned an error for.
    pub handler_errors: u64,
}

impl SimulationStats {
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped_partition + self.messages_dropped_loss + self.messages_dropped_crashed
    }

    /// Message delivery rate (sent / (sent + dropped)).
    pub fn delivery_rate(&self) -> f64 {
        let total = self.messages_sent + self.messages_dropped();
        if total == 0 {
            1.0
        } else {
            self.messages_sent as f64 / total as f64
        }
    }
}

/// Two nodes committed different blocks at the same height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyViolation {
    pub height: u64,
    pub hashes: Vec<(NodeIndex, Hash)>,
}

/// One simulated validator and its collaborators.
pub struct SimNode {
    pub engine: ConsensusEngine,
    pub key: KeyPair,
    pub storage: Arc<SimStorage>,
    pub utility: Arc<SimUtility>,
    pub state_sync: Arc<SimStateSync>,
    pub timer: SimTimer,
}

impl SimNode {
    pub fn address(&self) -> Address {
        self.key.address()
    }

    pub fn state(&self) -> ConsensusNodeState {
        self.engine.node_state()
    }
}

#[derive(Debug, Clone)]
struct Delivery {
    from: NodeIndex,
    to: NodeIndex,
    data: Vec<u8>,
}

/// Deterministic simulation runner.
///
/// Given the same seed, produces identical results every run. Node `i`
/// holds the validator with `NodeId(i + 1)`.
pub struct SimulationRunner {
    nodes: Vec<SimNode>,
    network: SimulatedNetwork,
    outbox: Outbox,
    in_flight: VecDeque<Delivery>,
    crashed: HashSet<NodeIndex>,
    rng: ChaCha8Rng,
    stats: SimulationStats,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig) -> Result<Self, ConsensusError> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut keys: Vec<KeyPair> = (0..config.num_validators)
            .map(|_| KeyPair::generate(&mut rng))
            .collect();
        keys.sort_by_key(KeyPair::address);

        let validators: Vec<ValidatorInfo> = keys
            .iter()
            .map(|k| ValidatorInfo::from_public_key(k.public_key(), 1))
            .collect();
        let routes: Arc<HashMap<Address, NodeIndex>> = Arc::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| (k.address(), i as NodeIndex))
                .collect(),
        );
        let outbox: Outbox = Arc::default();

        let mut nodes = Vec::with_capacity(keys.len());
        for (i, key) in keys.into_iter().enumerate() {
            let storage = Arc::new(SimStorage::new(validators.clone()));
            let utility = Arc::new(SimUtility::new(storage.clone()));
            let state_sync = Arc::new(SimStateSync::default());
            let timer = SimTimer::new();
            let network = Arc::new(SimNetworkPort::new(i as NodeIndex, routes.clone(), outbox.clone()));

            let engine = ConsensusEngine::new(
                config.consensus.clone(),
                key.clone(),
                Collaborators {
                    persistence: storage.clone(),
                    network,
                    utility: utility.clone(),
                    state_sync: state_sync.clone(),
                },
                Box::new(timer.clone()),
            )?;
            nodes.push(SimNode {
                engine,
                key,
                storage,
                utility,
                state_sync,
                timer,
            });
        }

        info!(
            validators = nodes.len(),
            seed = config.seed,
            order = ?config.network.delivery_order,
            "Simulation created"
        );

        Ok(Self {
            network: SimulatedNetwork::new(config.network, nodes.len() as u32),
            nodes,
            outbox,
            in_flight: VecDeque::new(),
            crashed: HashSet::new(),
            rng,
            stats: SimulationStats::default(),
        })
    }

    // ─── Accessors ───

    pub fn node(&self, index: NodeIndex) -> &SimNode {
        &self.nodes[index as usize]
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn num_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn network(&self) -> &SimulatedNetwork {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn heights(&self) -> Vec<u64> {
        self.nodes.iter().map(|n| n.engine.height()).collect()
    }

    /// Lowest current height among running nodes.
    pub fn min_height(&self) -> u64 {
        self.running()
            .map(|i| self.nodes[i as usize].engine.height())
            .min()
            .unwrap_or(0)
    }

    fn running(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.num_nodes()).filter(|i| !self.crashed.contains(i))
    }

    // ─── Control ───

    /// Start every node. In automatic mode each node broadcasts NewRound.
    pub fn start_all(&mut self) {
        for node in &self.nodes {
            node.engine.start();
        }
        self.route();
    }

    pub fn debug_command(&mut self, index: NodeIndex, command: DebugCommand) -> Result<(), ConsensusError> {
        let result = self.nodes[index as usize].engine.handle_debug_command(command);
        self.route();
        result
    }

    /// Send `TriggerNextView` to every running node.
    pub fn trigger_all(&mut self) {
        for index in self.running().collect::<Vec<_>>() {
            if let Err(e) = self.nodes[index as usize]
                .engine
                .handle_debug_command(DebugCommand::TriggerNextView)
            {
                warn!(node = index, error = %e, "Trigger failed");
            }
        }
        self.route();
    }

    pub fn submit_transaction(&self, index: NodeIndex, tx: Transaction) {
        self.nodes[index as usize].utility.submit_transaction(tx);
    }

    /// Submit the transaction to every node's pool.
    pub fn submit_transaction_all(&self, tx: Transaction) {
        for node in &self.nodes {
            node.utility.submit_transaction(tx.clone());
        }
    }

    /// Stop delivering to and from a node.
    pub fn crash(&mut self, index: NodeIndex) {
        info!(node = index, "Crashing node");
        self.crashed.insert(index);
    }

    pub fn recover(&mut self, index: NodeIndex) {
        info!(node = index, "Recovering node");
        self.crashed.remove(&index);
    }

    // ─── Message flow ───

    /// Move everything from the outbox onto the wire. Crashed nodes send
    /// nothing.
    fn route(&mut self) {
        let envelopes: Vec<Envelope> = std::mem::take(&mut *self.outbox.lock());
        for envelope in envelopes {
            if !self.crashed.contains(&envelope.from) {
                self.schedule(envelope);
            }
        }
    }

    /// Expand an envelope to its recipients, applying partitions and
    /// packet loss.
    fn schedule(&mut self, envelope: Envelope) {
        let targets: Vec<NodeIndex> = match envelope.to {
            Some(to) => vec![to],
            None => (0..self.num_nodes()).collect(),
        };
        for to in targets {
            match self.network.drop_reason(envelope.from, to, &mut self.rng) {
                Some(DropReason::Partition) => self.stats.messages_dropped_partition += 1,
                Some(DropReason::PacketLoss) => self.stats.messages_dropped_loss += 1,
                None => {
                    self.stats.messages_sent += 1;
                    self.in_flight.push_back(Delivery {
                        from: envelope.from,
                        to,
                        data: envelope.data.clone(),
                    });
                }
            }
        }
    }

    fn next_delivery(&mut self) -> Option<Delivery> {
        match self.network.delivery_order() {
            crate::DeliveryOrder::Fifo => self.in_flight.pop_front(),
            crate::DeliveryOrder::Random => {
                if self.in_flight.is_empty() {
                    return None;
                }
                let index = self.rng.gen_range(0..self.in_flight.len());
                self.in_flight.swap_remove_back(index)
            }
        }
    }

    /// Deliver one message. Returns false when nothing is in flight.
    pub fn step(&mut self) -> bool {
        self.route();
        let Some(delivery) = self.next_delivery() else {
            return false;
        };
        if self.crashed.contains(&delivery.to) {
            self.stats.messages_dropped_crashed += 1;
            return true;
        }
        trace!(from = delivery.from, to = delivery.to, "Delivering message");
        self.stats.messages_delivered += 1;
        if let Err(e) = self.nodes[delivery.to as usize]
            .engine
            .handle_message_bytes(&delivery.data)
        {
            debug!(node = delivery.to, error = %e, "Message handling failed");
            self.stats.handler_errors += 1;
        }
        self.route();
        true
    }

    /// Deliver until nothing is in flight or `max_steps` is reached.
    /// Returns the number of messages delivered.
    pub fn run_until_quiet(&mut self, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && self.step() {
            steps += 1;
        }
        steps
    }

    /// Deliver until `done` holds. Returns whether it did within `max_steps`.
    pub fn run_until(&mut self, max_steps: usize, done: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..max_steps {
            if done(self) {
                return true;
            }
            if !self.step() {
                return done(self);
            }
        }
        done(self)
    }

    /// Fire a node's armed round timer. Returns whether one was armed.
    pub fn fire_timeout(&mut self, index: NodeIndex) -> bool {
        if self.crashed.contains(&index) {
            return false;
        }
        let node = &self.nodes[index as usize];
        let Some(ticket) = node.timer.take() else {
            return false;
        };
        node.engine.on_round_timeout(ticket);
        self.stats.timeouts_fired += 1;
        self.route();
        true
    }

    pub fn fire_all_timeouts(&mut self) {
        for index in self.running().collect::<Vec<_>>() {
            self.fire_timeout(index);
        }
    }

    /// Alternate message delivery with round timeouts until every running
    /// node reaches `height` or `max_rounds` timeout rounds pass.
    pub fn run_to_height(&mut self, height: u64, max_rounds: usize, steps_per_round: usize) -> bool {
        for _ in 0..max_rounds {
            self.run_until_quiet(steps_per_round);
            if self.min_height() >= height {
                return true;
            }
            self.fire_all_timeouts();
        }
        self.min_height() >= height
    }

    /// Deliver a message straight to a node, bypassing the network.
    pub fn inject(&mut self, to: NodeIndex, message: HotstuffMessage) -> Result<(), ConsensusError> {
        let result = self.nodes[to as usize].engine.handle_message(message);
        self.route();
        result
    }

    /// Put a message on the wire as if `from` had sent it to `to`. Works
    /// for crashed senders, which makes it the tool for byzantine scenarios.
    pub fn send_as(&mut self, from: NodeIndex, to: NodeIndex, message: &HotstuffMessage) -> Result<(), ConsensusError> {
        let data = codec::encode_message(message)?;
        self.schedule(Envelope {
            from,
            to: Some(to),
            data,
        });
        Ok(())
    }

    // ─── State sync ───

    /// Feed a lagging node the blocks other nodes committed, in height
    /// order. Returns how many were accepted.
    pub fn sync_node(&mut self, index: NodeIndex) -> usize {
        let mut accepted = 0;
        loop {
            let target = &self.nodes[index as usize];
            let height = target.engine.height();
            let Some(block) = self.committed_block_from_peers(index, height) else {
                break;
            };
            match target.engine.handle_synced_block(block) {
                Ok(()) if target.engine.height() > height => accepted += 1,
                Ok(()) => break,
                Err(e) => {
                    warn!(node = index, height, error = %e, "Synced block rejected");
                    break;
                }
            }
        }
        self.route();
        accepted
    }

    fn committed_block_from_peers(&self, index: NodeIndex, height: u64) -> Option<Block> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i as NodeIndex != index)
            .find_map(|(_, node)| node.storage.block(height))
    }

    // ─── Checks ───

    /// Every height committed by more than one node must carry the same block.
    pub fn check_safety(&self) -> Result<(), SafetyViolation> {
        let mut by_height: BTreeMap<u64, Vec<(NodeIndex, Hash)>> = BTreeMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            for block in node.storage.blocks() {
                by_height
                    .entry(block.height())
                    .or_default()
                    .push((i as NodeIndex, block.hash()));
            }
        }
        for (height, hashes) in by_height {
            if hashes.windows(2).any(|w| w[0].1 != w[1].1) {
                return Err(SafetyViolation { height, hashes });
            }
        }
        Ok(())
    }
}
