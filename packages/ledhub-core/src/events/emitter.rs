//! Event emitter abstraction for decoupling the broadcaster from transport.

use super::BroadcastEvent;

/// Trait for emitting push events without knowledge of the transport.
///
/// The periodic liveness worker and the operator-command handlers use this
/// trait to emit; they don't know or care whether anyone is subscribed.
pub trait EventEmitter: Send + Sync {
    /// Emits a push event to every connected operator subscriber.
    fn emit(&self, event: BroadcastEvent);
}

/// No-op emitter, useful in tests that don't care about push delivery.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: BroadcastEvent) {}
}

/// Logging emitter for debugging and development.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: BroadcastEvent) {
        tracing::debug!(?event, "broadcast_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _event: BroadcastEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            count: AtomicUsize::new(0),
        });
        emitter.emit(BroadcastEvent::State { devices: vec![] });
        emitter.emit(BroadcastEvent::RoomsControl { rooms: vec![] });
        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }
}
