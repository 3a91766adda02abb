//! Simulated network with deterministic packet loss, partitions and
//! delivery order.

use crate::NodeIndex;
use hotstuff_core::{Network, NetworkError};
use hotstuff_types::{codec, Address, HotstuffMessage};
use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Order in which queued messages are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOrder {
    /// Oldest first.
    #[default]
    Fifo,
    /// Uniformly random among queued messages (seeded).
    Random,
}

/// Configuration for simulated network.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Packet loss rate (0.0 - 1.0). Messages are dropped with this probability.
    pub packet_loss_rate: f64,
    pub delivery_order: DeliveryOrder,
}

/// Network conditions between simulated nodes.
///
/// Supports:
/// - Packet loss (probabilistic message drops)
/// - Network partitions (blocking communication between node pairs)
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    num_nodes: u32,
    /// Partitioned node pairs. If (a, b) is in this set, messages from a to b are dropped.
    /// Partitions are directional - add both (a, b) and (b, a) for bidirectional partition.
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig, num_nodes: u32) -> Self {
        Self {
            config,
            num_nodes,
            partitions: HashSet::new(),
        }
    }

    // ─── Partition Management ───

    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.contains(&(from, to))
    }

    pub fn partition_unidirectional(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.insert((from, to));
    }

    pub fn partition_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Drop all messages between the two groups, both directions.
    pub fn partition_groups(&mut self, group_a: &[NodeIndex], group_b: &[NodeIndex]) {
        for &a in group_a {
            for &b in group_b {
                self.partition_bidirectional(a, b);
            }
        }
    }

    /// Cut a node off from every other node.
    pub fn isolate_node(&mut self, node: NodeIndex) {
        for other in 0..self.num_nodes {
            if other != node {
                self.partition_bidirectional(node, other);
            }
        }
    }

    pub fn heal_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.remove(&(a, b));
        self.partitions.remove(&(b, a));
    }

    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    // ─── Packet Loss ───

    pub fn should_drop_packet(&self, rng: &mut ChaCha8Rng) -> bool {
        self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate
    }

    pub fn set_packet_loss_rate(&mut self, rate: f64) {
        self.config.packet_loss_rate = rate.clamp(0.0, 1.0);
    }

    pub fn packet_loss_rate(&self) -> f64 {
        self.config.packet_loss_rate
    }

    pub fn delivery_order(&self) -> DeliveryOrder {
        self.config.delivery_order
    }

    pub fn set_delivery_order(&mut self, order: DeliveryOrder) {
        self.config.delivery_order = order;
    }

    /// Why a message from `from` to `to` would not arrive, if it would not.
    pub fn drop_reason(&self, from: NodeIndex, to: NodeIndex, rng: &mut ChaCha8Rng) -> Option<DropReason> {
        // Loopback never crosses the network.
        if from == to {
            return None;
        }
        if self.is_partitioned(from, to) {
            return Some(DropReason::Partition);
        }
        if self.should_drop_packet(rng) {
            return Some(DropReason::PacketLoss);
        }
        None
    }

    pub fn num_nodes(&self) -> u32 {
        self.num_nodes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Partition,
    PacketLoss,
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════

/// An encoded message waiting to be routed.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: NodeIndex,
    /// `None` for a broadcast.
    pub to: Option<NodeIndex>,
    pub data: Vec<u8>,
}

/// Shared outbox every simulated node writes into.
pub type Outbox = Arc<Mutex<Vec<Envelope>>>;

/// One node's [`Network`] endpoint.
///
/// Messages are encoded on send and queued; the runner routes and delivers
/// them, so nothing re-enters the engine while it dispatches.
#[derive(Debug)]
pub struct SimNetworkPort {
    index: NodeIndex,
    routes: Arc<HashMap<Address, NodeIndex>>,
    outbox: Outbox,
}

impl SimNetworkPort {
    pub fn new(index: NodeIndex, routes: Arc<HashMap<Address, NodeIndex>>, outbox: Outbox) -> Self {
        Self {
            index,
            routes,
            outbox,
        }
    }

    fn enqueue(&self, to: Option<NodeIndex>, message: &HotstuffMessage) -> Result<(), NetworkError> {
        let data = codec::encode_message(message).map_err(|e| NetworkError::Encode(e.to_string()))?;
        self.outbox.lock().push(Envelope {
            from: self.index,
            to,
            data,
        });
        Ok(())
    }
}

impl Network for SimNetworkPort {
    fn send(&self, to: &Address, message: HotstuffMessage) -> Result<(), NetworkError> {
        let index = *self.routes.get(to).ok_or(NetworkError::UnknownPeer(*to))?;
        self.enqueue(Some(index), &message)
    }

    fn broadcast(&self, message: HotstuffMessage) -> Result<(), NetworkError> {
        self.enqueue(None, &message)
    }
}
