//! Event emitter abstraction for decoupling the session from transport.
//!
//! The session coordinator depends on the [`EventEmitter`] trait rather than a
//! concrete broadcast channel, enabling testing and alternative transports.

use super::{Audience, Outbound, SessionEvent};

/// Trait for emitting session events without knowledge of transport.
///
/// Implementations must not block: the session emits while holding its state
/// lock so that delivery order matches commit order.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.broadcast(SessionEvent::ClearQueue);
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits an addressed event.
    fn emit(&self, outbound: Outbound);

    /// Emits an event to every listener.
    fn broadcast(&self, event: SessionEvent) {
        self.emit(Outbound {
            audience: Audience::All,
            event,
        });
    }

    /// Emits an event to every listener except `sender`.
    fn broadcast_except(&self, sender: &str, event: SessionEvent) {
        self.emit(Outbound {
            audience: Audience::AllExcept(sender.to_string()),
            event,
        });
    }

    /// Emits an event to a single listener.
    fn unicast(&self, connection_id: &str, event: SessionEvent) {
        self.emit(Outbound {
            audience: Audience::Only(connection_id.to_string()),
            event,
        });
    }
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level. Attach it to the bridge to mirror the
/// event stream into the server log.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, outbound: Outbound) {
        tracing::debug!(
            audience = ?outbound.audience,
            event = outbound.event.name(),
            "session_event"
        );
    }
}
