//! Pipeline Runner - event-driven job execution with tokio
//!
//! - Every job of the run is spawned at once on a JoinSet
//! - Each task awaits its own prejobs (watch channels), so a job starts as
//!   soon as its prejobs are terminal, independent of declaration order
//! - A fatal error cancels the shared token: waiting jobs and outstanding
//!   prompts are released and the run returns that error

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::{ConvoyError, Result};
use crate::event::{EventEmitter, EventKind, EventLog};
use crate::job::JobContext;
use crate::pipeline::Pipeline;
use crate::prompt::{self, Presenter};
use crate::runtime::execute::{execute_job, JobOutcome};
use crate::runtime::report::RunReport;
use crate::store::JobCache;

/// Runs a [`Pipeline`] once
pub struct Runner {
    pipeline: Pipeline,
    event_log: EventLog,
    cache: Option<Arc<dyn JobCache>>,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            event_log: EventLog::new(),
            cache: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Record into an existing log (e.g. one shared with a UI)
    pub fn with_event_log(mut self, event_log: EventLog) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn JobCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Token that aborts the run when cancelled
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the run; pending jobs fail and prompts are dropped
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute every job of the run and collect the report.
    ///
    /// Returns the first fatal error (or `Cancelled`) if the run was aborted.
    /// Ordinary job failures are part of the report, not an error.
    #[instrument(name = "run", skip_all, fields(jobs = self.pipeline.jobs_to_run().len()))]
    pub async fn run(&self, presenter: Arc<dyn Presenter>) -> Result<RunReport> {
        let start = Instant::now();
        let names = self.pipeline.jobs_to_run();

        self.event_log.emit(EventKind::PipelineStarted {
            job_count: names.len(),
            run_id: Uuid::new_v4().to_string(),
        });
        info!(isolated = self.pipeline.is_isolated(), "pipeline started");

        let (prompt_tx, prompt_rx) = prompt::channel();
        let serving = tokio::spawn(prompt::serve(prompt_rx, presenter, self.cancel.clone()));

        let emitter: Arc<dyn EventEmitter> = Arc::new(self.event_log.clone());
        let jobs = Arc::clone(self.pipeline.table());
        let mut join_set: JoinSet<JobOutcome> = JoinSet::new();

        for name in names {
            let Some(job) = self.pipeline.job(name) else {
                continue;
            };
            self.event_log.emit(EventKind::JobScheduled {
                job: Arc::clone(name),
                prejobs: job.spec().prejob_names().to_vec(),
            });

            let ctx = JobContext::new(
                Arc::clone(job),
                Arc::clone(&jobs),
                Arc::clone(self.pipeline.options()),
                prompt_tx.clone(),
                Arc::clone(&emitter),
                self.cancel.clone(),
            );
            let jobs = Arc::clone(&jobs);
            let cache = self.cache.clone();
            let name = Arc::clone(name);

            join_set.spawn(async move { (name, execute_job(ctx, jobs, cache).await) });
        }
        drop(prompt_tx);

        let mut abort: Option<(Option<Arc<str>>, ConvoyError)> = None;
        while let Some(joined) = join_set.join_next().await {
            let (job, e) = match joined {
                Ok((_, Ok(()))) => continue,
                Ok((name, Err(e))) => (Some(name), e),
                Err(join_error) => (
                    None,
                    ConvoyError::TaskPanicked {
                        details: join_error.to_string(),
                    },
                ),
            };

            // Cancellation errors follow the first real failure; keep that one.
            let replace = match &abort {
                None => true,
                Some((_, ConvoyError::Cancelled)) => !matches!(e, ConvoyError::Cancelled),
                Some(_) => false,
            };
            if replace {
                if !matches!(e, ConvoyError::Cancelled) {
                    error!(job = ?job.as_deref(), error = %e, "aborting run");
                }
                abort = Some((job, e));
            }
            self.cancel.cancel();
        }
        serving.abort();

        let duration = start.elapsed();
        if let Some((failed_job, e)) = abort {
            self.event_log.emit(EventKind::PipelineFailed {
                error: e.to_string(),
                failed_job: failed_job.filter(|_| !matches!(e, ConvoyError::Cancelled)),
            });
            return Err(e);
        }

        let submission_ok = self.pipeline.submission_ok();
        self.event_log.emit(EventKind::PipelineCompleted {
            duration_ms: duration.as_millis() as u64,
            submission_ok,
        });
        info!(
            duration_ms = duration.as_millis() as u64,
            submission_ok, "pipeline completed"
        );

        Ok(RunReport::collect(&self.pipeline, duration))
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("pipeline", &self.pipeline)
            .field("cached", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}
