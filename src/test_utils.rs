//! Test utilities for Convoy (test builds and the `test-fixtures` feature)
//!
//! Provides job builders, a worker context factory and collaborator mocks.
//! Centralizes common test patterns to reduce duplication.
//!
//! # Usage
//!
//! ```rust,ignore
//! use convoy::test_utils::*;
//!
//! // Jobs already in a terminal state, for harvesting and preconditions
//! let jobs = table([finished_job("title", &["The Matrix"]), skipped_job("year")]);
//!
//! // A RUNNING job context plus the receiving end of its prompt channel
//! let (ctx, prompts) = running_context(JobSpec::constant("x", ["1"]), jobs);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::collab::{ContentInspector, Entity, MetadataClient};
use crate::config::Options;
use crate::error::{ConvoyError, Result};
use crate::event::{EventEmitter, NoopEmitter};
use crate::job::{make_precondition, Job, JobContext, JobSpec, JobState, JobTable, RunSet, Worker};
use crate::prompt::{self, PromptReceiver};

// ═══════════════════════════════════════════════════════════════════════════
// JOBS
// ═══════════════════════════════════════════════════════════════════════════

/// Name-keyed table from jobs
pub fn table(jobs: impl IntoIterator<Item = Arc<Job>>) -> JobTable {
    jobs.into_iter()
        .map(|job| (Arc::clone(job.name_arc()), job))
        .collect()
}

fn construct(spec: JobSpec) -> Job {
    let name = Arc::clone(spec.name());
    let names = [Arc::clone(&name)];
    let precondition = make_precondition(
        &name,
        spec.condition().cloned(),
        RunSet {
            jobs_before_upload: &names,
            isolated_jobs: &[],
        },
    );
    let upstream: FxHashSet<Arc<str>> = spec.prejob_names().iter().cloned().collect();
    Job::new(spec, precondition, upstream)
}

fn drive(job: &Job, states: &[JobState]) {
    for state in states {
        job.transition(*state)
            .expect("test job follows legal transitions");
    }
}

/// A PENDING job
pub fn pending_job(name: &str) -> Arc<Job> {
    Arc::new(construct(JobSpec::constant(name, Vec::<String>::new())))
}

/// A FINISHED job with the given outputs
pub fn finished_job(name: &str, outputs: &[&str]) -> Arc<Job> {
    finished_job_with(name, outputs, &[])
}

/// A FINISHED job with outputs and attributes
pub fn finished_job_with(name: &str, outputs: &[&str], attributes: &[(&str, Value)]) -> Arc<Job> {
    let job = construct(JobSpec::constant(name, outputs.iter().copied()));
    drive(&job, &[JobState::WaitingOnPrejobs, JobState::Running]);
    for output in outputs {
        job.push_output(output.to_string());
    }
    for (key, value) in attributes {
        job.set_attribute(*key, value.clone());
    }
    drive(&job, &[JobState::Finished]);
    Arc::new(job)
}

/// A SKIPPED job
pub fn skipped_job(name: &str) -> Arc<Job> {
    let job = construct(JobSpec::constant(name, Vec::<String>::new()));
    drive(&job, &[JobState::Skipped]);
    Arc::new(job)
}

/// A FAILED job carrying `error`
pub fn failed_job(name: &str, error: &str) -> Arc<Job> {
    let job = construct(JobSpec::constant(name, Vec::<String>::new()));
    drive(&job, &[JobState::WaitingOnPrejobs, JobState::Running]);
    job.add_error(error);
    drive(&job, &[JobState::Failed]);
    Arc::new(job)
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTEXTS
// ═══════════════════════════════════════════════════════════════════════════

/// Context of a RUNNING job built from `spec`, reading from `jobs`.
///
/// The job's upstream is its direct prejobs. The returned receiver gets the
/// job's prompt requests; serve it with a presenter or drop it.
pub fn running_context(spec: JobSpec, jobs: JobTable) -> (JobContext, PromptReceiver) {
    running_context_with(spec, jobs, Options::default(), Arc::new(NoopEmitter))
}

/// Like [`running_context`] with explicit options and emitter
pub fn running_context_with(
    spec: JobSpec,
    mut jobs: JobTable,
    options: Options,
    emitter: Arc<dyn EventEmitter>,
) -> (JobContext, PromptReceiver) {
    let job = Arc::new(construct(spec));
    drive(&job, &[JobState::WaitingOnPrejobs, JobState::Running]);
    jobs.insert(Arc::clone(job.name_arc()), Arc::clone(&job));

    let (tx, rx) = prompt::channel();
    let ctx = JobContext::new(
        job,
        Arc::new(jobs),
        Arc::new(options),
        tx,
        emitter,
        CancellationToken::new(),
    );
    (ctx, rx)
}

// ═══════════════════════════════════════════════════════════════════════════
// WORKERS
// ═══════════════════════════════════════════════════════════════════════════

/// Worker that counts its invocations and emits fixed outputs
#[derive(Debug, Clone)]
pub struct CountingWorker {
    calls: Arc<AtomicUsize>,
    outputs: Vec<String>,
}

impl CountingWorker {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Shared counter, valid after the worker is moved into a spec
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Worker for CountingWorker {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for output in &self.outputs {
            ctx.send(output.clone())?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COLLABORATORS
// ═══════════════════════════════════════════════════════════════════════════

/// Scripted answer of [`MockClient::find_entity`]
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    Found(Entity),
    NotFound,
    Failed(String),
}

/// Metadata client answering from memory and recording every call
#[derive(Debug, Default)]
pub struct MockClient {
    known: FxHashMap<String, Entity>,
    metadata: FxHashMap<String, Map<String, Value>>,
    scripted: Mutex<VecDeque<MockResponse>>,
    calls: Mutex<Vec<String>>,
    created: AtomicUsize,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Known entity, matched case-insensitively by `find_entity`
    pub fn with_entity(mut self, name: &str, url: &str) -> Self {
        self.known
            .insert(name.to_lowercase(), Entity::new(name, url));
        self
    }

    pub fn with_metadata(mut self, id: &str, metadata: Value) -> Self {
        if let Value::Object(map) = metadata {
            self.metadata.insert(id.to_string(), map);
        }
        self
    }

    /// Responses used by `find_entity` before falling back to known entities
    pub fn with_find_responses(self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.scripted.lock().extend(responses);
        self
    }

    /// Calls in order, e.g. `find_entity(jeffrey owl)`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl MetadataClient for MockClient {
    async fn fetch_metadata(&self, id: &str) -> Result<Map<String, Value>> {
        self.record(format!("fetch_metadata({})", id));
        self.metadata
            .get(id)
            .cloned()
            .ok_or_else(|| ConvoyError::not_found(id))
    }

    async fn find_entity(&self, name: &str) -> Result<Entity> {
        self.record(format!("find_entity({})", name));
        let scripted = self.scripted.lock().pop_front();
        match scripted {
            Some(MockResponse::Found(entity)) => Ok(entity),
            Some(MockResponse::NotFound) => Err(ConvoyError::not_found(name)),
            Some(MockResponse::Failed(reason)) => Err(ConvoyError::request_failed(reason)),
            None => self
                .known
                .get(&name.to_lowercase())
                .cloned()
                .ok_or_else(|| ConvoyError::not_found(name)),
        }
    }

    async fn create_entity(&self, name: &str) -> Result<Entity> {
        self.record(format!("create_entity({})", name));
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Entity::new(
            name,
            format!("https://example.org/artist.php?id=new{}", id),
        ))
    }
}

/// Content inspector with fixed answers; `None` fields fail
#[derive(Debug, Clone, Default)]
pub struct MockInspector {
    pub duration: Option<Duration>,
    pub languages: Option<Vec<String>>,
    pub bit_depth: Option<u8>,
}

fn inspection_failed(what: &str) -> ConvoyError {
    ConvoyError::InspectionFailed {
        reason: format!("no {} available", what),
    }
}

#[async_trait]
impl ContentInspector for MockInspector {
    async fn duration(&self) -> Result<Duration> {
        self.duration.ok_or_else(|| inspection_failed("duration"))
    }

    async fn languages(&self) -> Result<Vec<String>> {
        self.languages
            .clone()
            .ok_or_else(|| inspection_failed("languages"))
    }

    async fn bit_depth(&self) -> Result<u8> {
        self.bit_depth.ok_or_else(|| inspection_failed("bit depth"))
    }
}
