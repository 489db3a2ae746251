//! Bridge implementation that maps session events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between the session and
//! the WebSocket layer, forwarding addressed events to the broadcast channel.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::Outbound;

/// Bridges session events to the WebSocket broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel that WebSocket handlers subscribe to.
/// Each handler drops envelopes whose audience excludes its connection.
///
/// The bridge also forwards to an optional mirror emitter (for example
/// [`super::LoggingEventEmitter`]) that can be set after construction.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<Outbound>,
    mirror: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            mirror: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an emitter that receives a copy of every event.
    pub fn set_mirror(&self, emitter: Arc<dyn EventEmitter>) {
        *self.mirror.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// WebSocket handlers use this to subscribe to events. Subscribe before
    /// requesting the join replay so no event falls between the two.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit(&self, outbound: Outbound) {
        if let Some(ref mirror) = *self.mirror.read() {
            mirror.emit(outbound.clone());
        }
        if let Err(e) = self.tx.send(outbound) {
            log::trace!("[EventBridge] No broadcast receivers: {}", e);
        }
    }
}
