//! Job - runtime record of one job within a run
//!
//! Holds the spec, the composed precondition, the state machine and the
//! collected output. State changes are published on a `watch` channel so
//! dependents can await a prejob reaching a terminal state.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use crate::error::{ConvoyError, Result};
use crate::job::precondition::Precondition;
use crate::job::spec::JobSpec;
use crate::job::state::JobState;

/// Name-keyed table of constructed jobs
pub type JobTable = FxHashMap<Arc<str>, Arc<Job>>;

#[derive(Debug, Default)]
struct JobRecord {
    output: Vec<String>,
    attributes: FxHashMap<String, Value>,
    warnings: Vec<String>,
    errors: Vec<String>,
    info: String,
    degraded: bool,
    cached: bool,
    started_at: Option<Instant>,
    duration: Option<Duration>,
}

pub struct Job {
    spec: JobSpec,
    precondition: Precondition,
    upstream: FxHashSet<Arc<str>>,
    record: RwLock<JobRecord>,
    state: watch::Sender<JobState>,
    pub(crate) prompt_lock: Mutex<()>,
}

impl Job {
    pub(crate) fn new(
        spec: JobSpec,
        precondition: Precondition,
        upstream: FxHashSet<Arc<str>>,
    ) -> Self {
        let (state, _) = watch::channel(JobState::Pending);
        Self {
            spec,
            precondition,
            upstream,
            record: RwLock::new(JobRecord::default()),
            state,
            prompt_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn name_arc(&self) -> &Arc<str> {
        &self.spec.name
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn precondition(&self) -> &Precondition {
        &self.precondition
    }

    /// Transitive prejobs of this job
    pub fn upstream(&self) -> &FxHashSet<Arc<str>> {
        &self.upstream
    }

    // ═══════════════════════════════════════════
    // STATE
    // ═══════════════════════════════════════════

    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == JobState::Finished
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Resolves once the job is FINISHED, SKIPPED or FAILED
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives in `self`, so the channel cannot close while we wait.
            Err(_) => self.state(),
        };
        state
    }

    pub(crate) fn transition(&self, next: JobState) -> Result<()> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                debug!(job = %self.name(), from = %state, to = %next, "transition");
                *state = next;
                true
            } else {
                result = Err(ConvoyError::IllegalTransition {
                    job: self.name().to_string(),
                    from: state.to_string(),
                    to: next.to_string(),
                });
                false
            }
        });
        result?;

        let mut record = self.record.write();
        match next {
            JobState::Running if record.started_at.is_none() => {
                record.started_at = Some(Instant::now());
            }
            JobState::Finished | JobState::Failed => {
                record.duration = record.started_at.map(|t| t.elapsed());
            }
            _ => {}
        }
        Ok(())
    }

    // ═══════════════════════════════════════════
    // OUTPUT AND MESSAGES
    // ═══════════════════════════════════════════

    pub fn output(&self) -> Vec<String> {
        self.record.read().output.clone()
    }

    pub fn output_len(&self) -> usize {
        self.record.read().output.len()
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.record.read().attributes.get(name).cloned()
    }

    pub fn attributes(&self) -> FxHashMap<String, Value> {
        self.record.read().attributes.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.record.read().warnings.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.record.read().errors.clone()
    }

    pub fn info(&self) -> String {
        self.record.read().info.clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.record.read().degraded
    }

    pub fn is_cached(&self) -> bool {
        self.record.read().cached
    }

    pub fn duration(&self) -> Option<Duration> {
        self.record.read().duration
    }

    /// `None` until FINISHED or FAILED; 1 on errors or unexpected empty output
    pub fn exit_code(&self) -> Option<i32> {
        match self.state() {
            JobState::Finished | JobState::Failed => {}
            _ => return None,
        }
        let record = self.record.read();
        let empty_not_ok = record.output.is_empty() && !self.spec.no_output_is_ok;
        if !record.errors.is_empty() || empty_not_ok {
            Some(1)
        } else {
            Some(0)
        }
    }

    pub(crate) fn push_output(&self, value: String) {
        self.record.write().output.push(value);
    }

    pub(crate) fn clear_output(&self) {
        self.record.write().output.clear();
    }

    pub(crate) fn set_attribute(&self, name: impl Into<String>, value: Value) {
        self.record.write().attributes.insert(name.into(), value);
    }

    pub(crate) fn add_warning(&self, message: impl Into<String>) {
        self.record.write().warnings.push(message.into());
    }

    pub(crate) fn clear_warnings(&self) {
        self.record.write().warnings.clear();
    }

    pub(crate) fn add_error(&self, message: impl Into<String>) {
        self.record.write().errors.push(message.into());
    }

    pub(crate) fn set_info(&self, info: impl Into<String>) {
        self.record.write().info = info.into();
    }

    pub(crate) fn mark_degraded(&self) {
        self.record.write().degraded = true;
    }

    pub(crate) fn mark_cached(&self) {
        self.record.write().cached = true;
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("output", &self.output())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::precondition::{make_precondition, RunSet};

    fn job(spec: JobSpec) -> Job {
        let names = [Arc::clone(spec.name())];
        let precondition = make_precondition(
            spec.name(),
            None,
            RunSet {
                jobs_before_upload: &names,
                isolated_jobs: &[],
            },
        );
        Job::new(spec, precondition, FxHashSet::default())
    }

    fn run_to(job: &Job, states: &[JobState]) {
        for state in states {
            job.transition(*state).unwrap();
        }
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let job = job(JobSpec::constant("a", ["x"]));
        let err = job.transition(JobState::Finished).unwrap_err();
        assert!(matches!(err, ConvoyError::IllegalTransition { .. }));
        assert_eq!(job.state(), JobState::Pending);
    }

    #[test]
    fn test_exit_code_rules() {
        let finished = job(JobSpec::constant("a", ["x"]));
        assert_eq!(finished.exit_code(), None);
        run_to(
            &finished,
            &[JobState::WaitingOnPrejobs, JobState::Running],
        );
        finished.push_output("x".into());
        assert_eq!(finished.exit_code(), None);
        finished.transition(JobState::Finished).unwrap();
        assert_eq!(finished.exit_code(), Some(0));

        let empty = job(JobSpec::constant("b", ["x"]));
        run_to(
            &empty,
            &[JobState::WaitingOnPrejobs, JobState::Running, JobState::Finished],
        );
        assert_eq!(empty.exit_code(), Some(1));

        let empty_ok = job(JobSpec::constant("c", ["x"]).no_output_is_ok(true));
        run_to(
            &empty_ok,
            &[JobState::WaitingOnPrejobs, JobState::Running, JobState::Finished],
        );
        assert_eq!(empty_ok.exit_code(), Some(0));

        let errored = job(JobSpec::constant("d", ["x"]).no_output_is_ok(true));
        run_to(&errored, &[JobState::WaitingOnPrejobs, JobState::Running]);
        errored.add_error("boom");
        errored.transition(JobState::Failed).unwrap();
        assert_eq!(errored.exit_code(), Some(1));

        let skipped = job(JobSpec::constant("e", ["x"]));
        skipped.transition(JobState::Skipped).unwrap();
        assert_eq!(skipped.exit_code(), None);
    }

    #[test]
    fn test_warnings_can_be_cleared() {
        let job = job(JobSpec::constant("a", ["x"]));
        job.add_warning("first");
        job.add_warning("second");
        assert_eq!(job.warnings(), vec!["first", "second"]);
        job.clear_warnings();
        assert!(job.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_wait_terminal_wakes_on_finish() {
        let job = Arc::new(job(JobSpec::constant("a", ["x"])));
        let waiter = {
            let job = Arc::clone(&job);
            tokio::spawn(async move { job.wait_terminal().await })
        };

        run_to(
            &job,
            &[JobState::WaitingOnPrejobs, JobState::Running, JobState::Finished],
        );
        assert_eq!(waiter.await.unwrap(), JobState::Finished);
    }

    #[tokio::test]
    async fn test_wait_terminal_returns_immediately_when_done() {
        let job = job(JobSpec::constant("a", ["x"]));
        job.transition(JobState::Skipped).unwrap();
        assert_eq!(job.wait_terminal().await, JobState::Skipped);
    }
}
