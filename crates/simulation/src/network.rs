//! Simulated gossip network with silencing and payload injection.

use hare_consensus::{NetworkError, NetworkService};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct NodeSlot {
    /// Per-protocol inbound channels registered by this node.
    subscriptions: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    /// A silenced node's broadcasts vanish, as if it had crashed.
    silenced: bool,
}

struct Inner {
    nodes: Vec<NodeSlot>,
    /// Observers of all delivered traffic, as `(from, payload)`.
    taps: Vec<mpsc::UnboundedSender<(usize, Vec<u8>)>>,
}

/// An in-memory gossip cloud shared by all nodes of a cluster.
///
/// Broadcast delivers the payload to every subscribed node, the sender
/// included: gossip re-delivers self-published messages, and the protocol
/// counts a participant's own evidence through that loopback.
#[derive(Clone)]
pub struct SimNetwork {
    inner: Arc<Mutex<Inner>>,
}

impl SimNetwork {
    /// Create a cloud for `nodes` participants.
    pub fn new(nodes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                nodes: (0..nodes).map(|_| NodeSlot::default()).collect(),
                taps: Vec::new(),
            })),
        }
    }

    /// The per-node view implementing [`NetworkService`].
    pub fn handle(&self, node: usize) -> NodeHandle {
        NodeHandle {
            node,
            network: self.clone(),
        }
    }

    /// Drop all future broadcasts from `node`.
    pub fn silence(&self, node: usize) {
        self.inner.lock().nodes[node].silenced = true;
    }

    /// Observe every delivered payload together with its sender index.
    pub fn tap(&self) -> mpsc::UnboundedReceiver<(usize, Vec<u8>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().taps.push(tx);
        rx
    }

    /// Deliver a crafted payload as if `from` had broadcast it, bypassing
    /// the silence flag. This is the Byzantine actor's entry point.
    pub fn inject_from(&self, from: usize, protocol: &str, payload: Vec<u8>) {
        self.deliver(from, protocol, payload);
    }

    fn deliver(&self, from: usize, protocol: &str, payload: Vec<u8>) {
        let mut inner = self.inner.lock();
        for slot in &mut inner.nodes {
            if let Some(subscribers) = slot.subscriptions.get_mut(protocol) {
                // Closed receivers belong to stopped processes; drop them.
                subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
            }
        }
        inner
            .taps
            .retain(|tx| tx.send((from, payload.clone())).is_ok());
    }
}

/// One node's view of the cloud.
pub struct NodeHandle {
    node: usize,
    network: SimNetwork,
}

impl NetworkService for NodeHandle {
    fn register_gossip_protocol(&self, protocol: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.network.inner.lock().nodes[self.node]
            .subscriptions
            .entry(protocol.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn broadcast(&self, protocol: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        if self.network.inner.lock().nodes[self.node].silenced {
            return Ok(());
        }
        self.network.deliver(self.node, protocol, payload);
        Ok(())
    }
}
