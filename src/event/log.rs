//! EventLog - append-only record of a pipeline run
//!
//! Tests use it as an ordering oracle: every job transition the runner makes
//! is mirrored by exactly one event, with monotonically increasing ids.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Single event in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since the log was created (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types
///
/// Uses Arc<str> for job name fields to enable cheap cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // PIPELINE LEVEL
    // ═══════════════════════════════════════════
    PipelineStarted {
        job_count: usize,
        run_id: String,
    },
    PipelineCompleted {
        duration_ms: u64,
        submission_ok: bool,
    },
    PipelineFailed {
        error: String,
        failed_job: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // JOB LEVEL
    // ═══════════════════════════════════════════
    JobScheduled {
        job: Arc<str>,
        prejobs: Vec<Arc<str>>,
    },
    JobStarted {
        job: Arc<str>,
    },
    JobSkipped {
        job: Arc<str>,
        reason: String,
    },
    JobFinished {
        job: Arc<str>,
        outputs: usize,
        degraded: bool,
        cached: bool,
        duration_ms: u64,
    },
    JobFailed {
        job: Arc<str>,
        error: String,
        duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // FINE-GRAINED
    // ═══════════════════════════════════════════
    JobOutput {
        job: Arc<str>,
        value: String,
    },
    JobWarning {
        job: Arc<str>,
        message: String,
    },
    PromptIssued {
        job: Arc<str>,
        question: String,
    },
    PromptAnswered {
        job: Arc<str>,
    },
}

impl EventKind {
    /// Job name if the event is job-related
    pub fn job(&self) -> Option<&str> {
        match self {
            Self::JobScheduled { job, .. }
            | Self::JobStarted { job }
            | Self::JobSkipped { job, .. }
            | Self::JobFinished { job, .. }
            | Self::JobFailed { job, .. }
            | Self::JobOutput { job, .. }
            | Self::JobWarning { job, .. }
            | Self::PromptIssued { job, .. }
            | Self::PromptAnswered { job } => Some(job),
            Self::PipelineStarted { .. }
            | Self::PipelineCompleted { .. }
            | Self::PipelineFailed { .. } => None,
        }
    }

    pub fn is_pipeline_event(&self) -> bool {
        matches!(
            self,
            Self::PipelineStarted { .. }
                | Self::PipelineCompleted { .. }
                | Self::PipelineFailed { .. }
        )
    }

    /// Whether this event marks a job reaching a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::JobSkipped { .. } | Self::JobFinished { .. } | Self::JobFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        // Allocate the id under the write lock so ids and positions agree.
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Events of one job, in emission order
    pub fn filter_job(&self, job: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.job() == Some(job))
                .cloned()
                .collect()
        })
    }

    pub fn pipeline_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_pipeline_event())
                .cloned()
                .collect()
        })
    }

    /// Id of the first event of `job` matching `pred`
    pub fn first_id(&self, job: &str, pred: impl Fn(&EventKind) -> bool) -> Option<u64> {
        self.with_events(|events| {
            events
                .iter()
                .find(|e| e.kind.job() == Some(job) && pred(&e.kind))
                .map(|e| e.id)
        })
    }

    /// Id of the event in which `job` reached a terminal state
    pub fn terminal_id(&self, job: &str) -> Option<u64> {
        self.first_id(job, EventKind::is_terminal)
    }

    /// Id of the event in which `job` started running
    pub fn started_id(&self, job: &str) -> Option<u64> {
        self.first_id(job, |k| matches!(k, EventKind::JobStarted { .. }))
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_emit_assigns_monotonic_ids() {
        let log = EventLog::new();
        let a = log.emit(EventKind::JobStarted { job: "a".into() });
        let b = log.emit(EventKind::JobStarted { job: "b".into() });
        assert!(a < b);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_filter_job_and_pipeline_events() {
        let log = EventLog::new();
        log.emit(EventKind::PipelineStarted {
            job_count: 2,
            run_id: "r".into(),
        });
        log.emit(EventKind::JobStarted { job: "a".into() });
        log.emit(EventKind::JobOutput {
            job: "a".into(),
            value: "x".into(),
        });
        log.emit(EventKind::JobStarted { job: "b".into() });

        assert_eq!(log.filter_job("a").len(), 2);
        assert_eq!(log.filter_job("b").len(), 1);
        assert_eq!(log.pipeline_events().len(), 1);
    }

    #[test]
    fn test_terminal_and_started_ids() {
        let log = EventLog::new();
        log.emit(EventKind::JobStarted { job: "a".into() });
        log.emit(EventKind::JobSkipped {
            job: "b".into(),
            reason: "precondition".into(),
        });
        log.emit(EventKind::JobFinished {
            job: "a".into(),
            outputs: 1,
            degraded: false,
            cached: false,
            duration_ms: 0,
        });

        assert_eq!(log.started_id("a"), Some(0));
        assert_eq!(log.terminal_id("b"), Some(1));
        assert_eq!(log.terminal_id("a"), Some(2));
        assert_eq!(log.started_id("b"), None);
    }

    #[test]
    fn test_to_json_is_tagged() {
        let log = EventLog::new();
        log.emit(EventKind::PromptIssued {
            job: "title".into(),
            question: "Title:".into(),
        });

        let json = log.to_json();
        assert_eq!(json[0]["kind"]["type"], "prompt_issued");
        assert_eq!(json[0]["kind"]["job"], "title");
    }

    #[test]
    fn test_concurrent_emission() {
        let log = EventLog::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        log.emit(EventKind::JobStarted {
                            job: format!("job{}", i).into(),
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let events = log.events();
        assert_eq!(events.len(), 400);
        assert!(events.windows(2).all(|w| w[0].id < w[1].id));
    }
}
