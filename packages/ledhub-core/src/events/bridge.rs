//! Bridge implementation that maps push events to the WebSocket broadcast
//! transport.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::BroadcastEvent;

/// Bridges push events to the WebSocket broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel that every `/ws` connection subscribes
/// to independently.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit(&self, event: BroadcastEvent) {
        if let Err(e) = self.tx.send(event) {
            log::trace!("[EventBridge] no broadcast receivers: {e}");
        }
    }
}
