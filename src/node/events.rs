//! Fire-and-forget node events.
//!
//! A broadcast hub: the chain writer and mempool publish, any number of
//! subscribers (query surfaces, explorers, tests) listen. Publishing never
//! blocks and never fails the publisher; a hub with no subscribers drops
//! events silently.

use tokio::sync::broadcast;
use tracing::debug;

use crate::consensus::types::Hash;

/// Events emitted by the node core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    BlockConnected { hash: Hash, height: u32 },
    BlockDisconnected { hash: Hash, height: u32 },
    TxAdmitted { txid: Hash },
    TxEvicted { txid: Hash, reason: String },
}

pub struct EventHub {
    sender: broadcast::Sender<NodeEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventHub { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: NodeEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(?event, "no event subscribers");
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        EventHub::new(256)
    }
}
