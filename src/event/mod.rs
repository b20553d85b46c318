//! Event Module - audit trail of a pipeline run
//!
//! Key types:
//! - `Event`: Envelope with id + timestamp + kind
//! - `EventKind`: pipeline-level and job-level variants
//! - `EventLog`: Thread-safe, append-only log
//! - `EventEmitter`: Trait for dependency injection
//! - `NoopEmitter`: Zero-cost no-op for testing

mod emitter;
mod log;

pub use emitter::{EventEmitter, NoopEmitter};
pub use log::{Event, EventKind, EventLog};
