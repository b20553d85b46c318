//! Precondition Evaluator
//!
//! A job runs only if it belongs to this run (structural applicability) and
//! its optional [`Check`] holds. Checks are synchronous and side-effect free;
//! they are evaluated once all prejobs are terminal, so they may look at
//! prejob outputs through a read-only [`Harvester`].

use std::fmt;
use std::sync::Arc;

use crate::config::Options;
use crate::job::JobState;
use crate::payload::Harvester;

/// Caller predicate over options and prejob state
pub type Predicate = Arc<dyn Fn(&Options, &Harvester<'_>) -> bool + Send + Sync>;

/// Extra condition attached to a job
#[derive(Clone)]
pub enum Check {
    /// Option value is truthy
    OptionSet(String),
    /// Upstream job reached FINISHED
    Finished(String),
    /// Upstream job FINISHED with a non-empty first output
    OutputPresent(String),
    Not(Box<Check>),
    All(Vec<Check>),
    Any(Vec<Check>),
    /// Arbitrary predicate; `reads` lists the upstream jobs it inspects
    Custom {
        reads: Vec<String>,
        predicate: Predicate,
    },
}

impl Check {
    pub fn option(key: impl Into<String>) -> Self {
        Self::OptionSet(key.into())
    }

    pub fn finished(job: impl Into<String>) -> Self {
        Self::Finished(job.into())
    }

    pub fn output_present(job: impl Into<String>) -> Self {
        Self::OutputPresent(job.into())
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Options, &Harvester<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            reads: Vec::new(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn custom_reading<F>(reads: impl IntoIterator<Item = impl Into<String>>, predicate: F) -> Self
    where
        F: Fn(&Options, &Harvester<'_>) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            reads: reads.into_iter().map(Into::into).collect(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn evaluate(&self, options: &Options, view: &Harvester<'_>) -> bool {
        match self {
            Self::OptionSet(key) => options.flag(key),
            Self::Finished(job) => matches!(view.state(job), Ok(JobState::Finished)),
            Self::OutputPresent(job) => view
                .get_job_output_or(job, 0, "")
                .is_ok_and(|first| !first.is_empty()),
            Self::Not(inner) => !inner.evaluate(options, view),
            Self::All(checks) => checks.iter().all(|c| c.evaluate(options, view)),
            Self::Any(checks) => checks.iter().any(|c| c.evaluate(options, view)),
            Self::Custom { predicate, .. } => predicate(options, view),
        }
    }

    /// Upstream jobs this check inspects
    pub fn referenced_jobs(&self) -> Vec<&str> {
        let mut jobs = Vec::new();
        self.collect_jobs(&mut jobs);
        jobs
    }

    fn collect_jobs<'a>(&'a self, jobs: &mut Vec<&'a str>) {
        match self {
            Self::OptionSet(_) => {}
            Self::Finished(job) | Self::OutputPresent(job) => jobs.push(job),
            Self::Not(inner) => inner.collect_jobs(jobs),
            Self::All(checks) | Self::Any(checks) => {
                for check in checks {
                    check.collect_jobs(jobs);
                }
            }
            Self::Custom { reads, .. } => jobs.extend(reads.iter().map(String::as_str)),
        }
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OptionSet(key) => f.debug_tuple("OptionSet").field(key).finish(),
            Self::Finished(job) => f.debug_tuple("Finished").field(job).finish(),
            Self::OutputPresent(job) => f.debug_tuple("OutputPresent").field(job).finish(),
            Self::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Self::All(checks) => f.debug_tuple("All").field(checks).finish(),
            Self::Any(checks) => f.debug_tuple("Any").field(checks).finish(),
            Self::Custom { reads, .. } => f.debug_struct("Custom").field("reads", reads).finish(),
        }
    }
}

/// The two job lists that decide structural applicability
#[derive(Debug, Clone, Copy)]
pub struct RunSet<'a> {
    pub jobs_before_upload: &'a [Arc<str>],
    pub isolated_jobs: &'a [Arc<str>],
}

/// Composed precondition of one job
#[derive(Debug, Clone)]
pub struct Precondition {
    job: Arc<str>,
    in_run: bool,
    extra: Option<Check>,
}

impl Precondition {
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Structural part: the job belongs to this run
    pub fn is_applicable(&self) -> bool {
        self.in_run
    }

    /// Whether the job may be skipped by its extra check
    pub fn is_gated(&self) -> bool {
        self.extra.is_some()
    }

    pub fn extra(&self) -> Option<&Check> {
        self.extra.as_ref()
    }

    pub fn check(&self, options: &Options, view: &Harvester<'_>) -> bool {
        self.in_run
            && self
                .extra
                .as_ref()
                .is_none_or(|check| check.evaluate(options, view))
    }
}

/// Compose structural applicability with an optional caller check.
///
/// With a non-empty `isolated_jobs` list the job must be in it; otherwise it
/// must be in `jobs_before_upload`.
pub fn make_precondition(job: &Arc<str>, extra: Option<Check>, run: RunSet<'_>) -> Precondition {
    let in_run = if run.isolated_jobs.is_empty() {
        run.jobs_before_upload.iter().any(|j| j == job)
    } else {
        run.isolated_jobs.iter().any(|j| j == job)
    };

    Precondition {
        job: Arc::clone(job),
        in_run,
        extra,
    }
}
