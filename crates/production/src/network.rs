//! In-process transport connecting node runners in one process.
//!
//! Every runner registers its event sender with a shared [`LocalHub`].
//! Messages are encoded exactly as on a real wire and arrive as
//! `Event::MessageReceived`. Delivery is fire-and-forget: a full inbox drops
//! the message, as a congested link would.

use hotstuff_core::{Event, Network, NetworkError};
use hotstuff_types::{codec, Address, HotstuffMessage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

/// Registry of node inboxes keyed by validator address.
#[derive(Debug, Default)]
pub struct LocalHub {
    peers: RwLock<HashMap<Address, mpsc::Sender<Event>>>,
}

impl LocalHub {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Attach a node's inbox. Replaces an earlier registration.
    pub fn register(&self, address: Address, inbox: mpsc::Sender<Event>) {
        self.peers.write().insert(address, inbox);
    }

    pub fn unregister(&self, address: &Address) {
        self.peers.write().remove(address);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    fn deliver(&self, from: &Address, to: &Address, data: Vec<u8>) -> Result<(), NetworkError> {
        let inbox = self
            .peers
            .read()
            .get(to)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(*to))?;
        match inbox.try_send(Event::MessageReceived { data }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(%from, %to, "Peer inbox full, dropping message");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(NetworkError::Closed),
        }
    }
}

/// One node's view of the hub.
#[derive(Debug, Clone)]
pub struct LocalNetwork {
    address: Address,
    hub: Arc<LocalHub>,
}

impl LocalNetwork {
    pub fn new(address: Address, hub: Arc<LocalHub>) -> Self {
        Self { address, hub }
    }

    fn encode(message: &HotstuffMessage) -> Result<Vec<u8>, NetworkError> {
        codec::encode_message(message).map_err(|e| NetworkError::Encode(e.to_string()))
    }
}

impl Network for LocalNetwork {
    fn send(&self, to: &Address, message: HotstuffMessage) -> Result<(), NetworkError> {
        trace!(from = %self.address, %to, step = %message.step, "Sending message");
        self.hub.deliver(&self.address, to, Self::encode(&message)?)
    }

    fn broadcast(&self, message: HotstuffMessage) -> Result<(), NetworkError> {
        let data = Self::encode(&message)?;
        let peers: Vec<Address> = self.hub.peers.read().keys().copied().collect();
        trace!(from = %self.address, peers = peers.len(), step = %message.step, "Broadcasting message");
        for peer in peers {
            // A peer that went away must not stop delivery to the rest.
            if let Err(e) = self.hub.deliver(&self.address, &peer, data.clone()) {
                warn!(from = %self.address, to = %peer, error = %e, "Broadcast delivery failed");
            }
        }
        Ok(())
    }
}
