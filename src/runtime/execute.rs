//! Execution of a single job inside its runner task
//!
//! The task walks the job through its state machine:
//! wait for prejobs, evaluate the precondition, replay a cached result or
//! run the body, then settle on FINISHED, SKIPPED or FAILED.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::error::{ConvoyError, Result};
use crate::event::EventKind;
use crate::job::{run_choice, run_text, Job, JobBody, JobContext, JobState, JobTable};
use crate::store::{CacheEntry, CacheKey, JobCache};

/// What a job task reports back to the runner
pub(crate) type JobOutcome = (Arc<str>, Result<()>);

fn millis(job: &Job) -> u64 {
    job.duration().map_or(0, |d| d.as_millis() as u64)
}

fn skip(ctx: &JobContext, reason: String) -> Result<()> {
    let job = ctx.job();
    job.transition(JobState::Skipped)?;
    debug!(job = %job.name(), %reason, "skipped");
    ctx.emitter().emit(EventKind::JobSkipped {
        job: Arc::clone(job.name_arc()),
        reason,
    });
    Ok(())
}

fn finish(ctx: &JobContext) -> Result<()> {
    let job = ctx.job();
    if job.state() == JobState::Prompting {
        job.transition(JobState::Running)?;
    }
    job.transition(JobState::Finished)?;
    ctx.emitter().emit(EventKind::JobFinished {
        job: Arc::clone(job.name_arc()),
        outputs: job.output_len(),
        degraded: job.is_degraded(),
        cached: job.is_cached(),
        duration_ms: millis(job),
    });
    Ok(())
}

fn fail(ctx: &JobContext, error: &ConvoyError) -> Result<()> {
    let job = ctx.job();
    job.add_error(error.to_string());
    job.transition(JobState::Failed)?;
    ctx.emitter().emit(EventKind::JobFailed {
        job: Arc::clone(job.name_arc()),
        error: error.to_string(),
        duration_ms: millis(job),
    });
    Ok(())
}

/// A FAILED job upstream of the one being run
struct FailedUpstream {
    name: Arc<str>,
    direct: bool,
}

impl FailedUpstream {
    fn warning(&self) -> String {
        if self.direct {
            format!("Skipped because prejob '{}' failed", self.name)
        } else {
            format!("Skipped because upstream job '{}' failed", self.name)
        }
    }
}

/// Wait until every prejob is terminal
async fn await_prejobs(ctx: &JobContext, jobs: &JobTable) -> Result<()> {
    for prejob in ctx.spec().prejob_names() {
        let Some(prejob) = jobs.get(prejob) else {
            continue;
        };
        tokio::select! {
            _ = ctx.cancelled() => return Err(ConvoyError::Cancelled),
            _ = prejob.wait_terminal() => {}
        }
    }
    Ok(())
}

/// Nearest FAILED job upstream, direct prejobs first.
///
/// Every upstream job is terminal once the direct prejobs are, so a failure
/// anywhere in the chain is visible here even if the jobs in between were
/// skipped.
fn failed_upstream(ctx: &JobContext, jobs: &JobTable) -> Option<FailedUpstream> {
    let mut queue: VecDeque<(&Arc<str>, bool)> = ctx
        .spec()
        .prejob_names()
        .iter()
        .map(|name| (name, true))
        .collect();
    let mut seen = FxHashSet::default();

    while let Some((name, direct)) = queue.pop_front() {
        if !seen.insert(name) {
            continue;
        }
        let Some(job) = jobs.get(name) else {
            continue;
        };
        if job.state() == JobState::Failed {
            return Some(FailedUpstream {
                name: Arc::clone(name),
                direct,
            });
        }
        queue.extend(job.spec().prejob_names().iter().map(|n| (n, false)));
    }
    None
}

async fn run_body(ctx: &JobContext) -> Result<()> {
    match ctx.spec().body() {
        JobBody::Worker(worker) => worker.run(ctx.clone()).await,
        JobBody::Text(field) => run_text(ctx, field).await,
        JobBody::Choice(field) => run_choice(ctx, field).await,
        JobBody::Constant(values) => {
            for value in values {
                ctx.send(value.clone())?;
            }
            Ok(())
        }
    }
}

fn cache_key(ctx: &JobContext, cache: Option<&Arc<dyn JobCache>>) -> Option<CacheKey> {
    let bypass = ctx.options().ignore_cache || ctx.spec().ignores_cache();
    (cache.is_some() && !bypass).then(|| CacheKey::for_job(ctx.job()))
}

/// Replay a cached result; `Ok(false)` on a miss
async fn replay(ctx: &JobContext, cache: &dyn JobCache, key: &CacheKey) -> Result<bool> {
    let entry = match cache.load(key).await {
        Ok(Some(entry)) => entry,
        Ok(None) => return Ok(false),
        Err(e) => {
            warn!(job = %ctx.name(), error = %e, "ignoring unreadable cache entry");
            return Ok(false);
        }
    };

    debug!(job = %ctx.name(), %key, "replaying cached result");
    for (name, value) in entry.attributes {
        ctx.set_attribute(name, value);
    }
    for value in entry.output {
        ctx.send(value)?;
    }
    ctx.job().mark_cached();
    Ok(true)
}

async fn store(ctx: &JobContext, cache: &dyn JobCache, key: &CacheKey) {
    let job = ctx.job();
    if job.exit_code() != Some(0) || job.is_degraded() {
        return;
    }
    if let Err(e) = cache.store(key, &CacheEntry::from_job(job)).await {
        warn!(job = %job.name(), error = %e, "failed to cache result");
    }
}

/// Drive one job to a terminal state.
///
/// `Err` is returned only for errors that must abort the run: fatal errors
/// and cancellation. Any other failure leaves the job FAILED and returns `Ok`.
pub(crate) async fn execute_job(
    ctx: JobContext,
    jobs: Arc<JobTable>,
    cache: Option<Arc<dyn JobCache>>,
) -> Result<()> {
    let job = Arc::clone(ctx.job());
    job.transition(JobState::WaitingOnPrejobs)?;

    if let Err(e) = await_prejobs(&ctx, &jobs).await {
        job.transition(JobState::Failed)?;
        return Err(e);
    }

    if let Some(failed) = failed_upstream(&ctx, &jobs) {
        ctx.warn(failed.warning());
        return skip(&ctx, format!("upstream job '{}' failed", failed.name));
    }
    if !job.precondition().check(ctx.options(), &ctx.harvester()) {
        return skip(&ctx, "precondition not met".to_string());
    }

    job.transition(JobState::Running)?;
    ctx.emitter().emit(EventKind::JobStarted {
        job: Arc::clone(job.name_arc()),
    });

    let key = cache_key(&ctx, cache.as_ref());
    if let (Some(cache), Some(key)) = (&cache, &key) {
        if replay(&ctx, cache.as_ref(), key).await? {
            return finish(&ctx);
        }
    }

    let outcome = tokio::select! {
        _ = ctx.cancelled() => Err(ConvoyError::Cancelled),
        outcome = run_body(&ctx) => outcome,
    };

    match outcome {
        Ok(()) => {
            finish(&ctx)?;
            if let (Some(cache), Some(key)) = (&cache, &key) {
                store(&ctx, cache.as_ref(), key).await;
            }
            Ok(())
        }
        Err(ConvoyError::Cancelled) => {
            job.transition(JobState::Failed)?;
            Err(ConvoyError::Cancelled)
        }
        Err(e) if e.is_fatal() => {
            fail(&ctx, &e)?;
            Err(e)
        }
        Err(e) if job.spec().catches(e.kind()) => {
            warn!(job = %job.name(), error = %e, "caught error, finishing degraded");
            ctx.warn(e.to_string());
            job.clear_output();
            job.mark_degraded();
            finish(&ctx)
        }
        Err(e) => {
            debug!(job = %job.name(), error = %e, "job failed");
            fail(&ctx, &e)?;
            Ok(())
        }
    }
}
