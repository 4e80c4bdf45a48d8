//! Upload event emitter port.
//!
//! This port abstracts upload event emission, allowing the upload manager
//! to emit events without coupling to transport details (channels, SSE, a
//! terminal renderer, etc.).

use tokio::sync::broadcast;

use crate::upload::UploadEvent;

/// Port for emitting upload events.
///
/// Implementations handle the actual event delivery. `emit` must not block:
/// it is called while the scheduler is mid-transition.
pub trait UploadEventEmitterPort: Send + Sync {
    /// Emit an upload event.
    fn emit(&self, event: UploadEvent);

    /// Clone this emitter into a boxed trait object.
    ///
    /// This enables cloning of `Arc<dyn UploadEventEmitterPort>` without
    /// requiring the underlying type to implement Clone.
    fn clone_box(&self) -> Box<dyn UploadEventEmitterPort>;
}

/// A no-op emitter for tests and headless contexts.
#[derive(Debug, Clone, Default)]
pub struct NoopUploadEmitter;

impl NoopUploadEmitter {
    /// Create a new no-op upload emitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UploadEventEmitterPort for NoopUploadEmitter {
    fn emit(&self, _event: UploadEvent) {
        // Intentionally do nothing
    }

    fn clone_box(&self) -> Box<dyn UploadEventEmitterPort> {
        Box::new(self.clone())
    }
}

/// Fan-out emitter backed by a `tokio::sync::broadcast` channel.
///
/// Slow subscribers lag (and are told so by `RecvError::Lagged`) instead of
/// stalling the scheduler.
#[derive(Debug, Clone)]
pub struct BroadcastUploadEmitter {
    tx: broadcast::Sender<UploadEvent>,
}

impl BroadcastUploadEmitter {
    /// Create an emitter buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastUploadEmitter {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl UploadEventEmitterPort for BroadcastUploadEmitter {
    fn emit(&self, event: UploadEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }

    fn clone_box(&self) -> Box<dyn UploadEventEmitterPort> {
        Box::new(self.clone())
    }
}
