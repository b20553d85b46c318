//! EventEmitter Trait - abstraction for event emission
//!
//! Jobs and the runner emit through `Arc<dyn EventEmitter>`: the real
//! `EventLog` in production, `NoopEmitter` when a job is driven directly.

use super::log::{EventKind, EventLog};

/// Trait for emitting events during a pipeline run
pub trait EventEmitter: Send + Sync {
    /// Emit an event and return its ID
    fn emit(&self, kind: EventKind) -> u64;
}

impl EventEmitter for EventLog {
    fn emit(&self, kind: EventKind) -> u64 {
        EventLog::emit(self, kind)
    }
}

/// No-op emitter for testing (always returns 0)
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _kind: EventKind) -> u64 {
        0
    }
}
