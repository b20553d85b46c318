//! JobSpec - static definition of a job, built before the pipeline
//!
//! A spec names the job, lists its prejobs and reads, carries the optional
//! precondition check and the body that produces output: an async worker, an
//! interactive field, or a constant.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashSet;

use crate::error::{ErrorKind, Result};
use crate::job::context::JobContext;
use crate::job::field::{ChoiceField, TextField};
use crate::job::precondition::Check;

/// Validates text before it is accepted; `Err(Validation)` re-prompts
pub type Validator = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Rewrites text before validation
pub type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Async producer of job output
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<()>;
}

/// Adapter turning an async closure into a [`Worker`]
pub struct FnWorker<F>(pub F);

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(&self, ctx: JobContext) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// What produces a job's output
#[derive(Clone)]
pub enum JobBody {
    Worker(Arc<dyn Worker>),
    Text(TextField),
    Choice(ChoiceField),
    Constant(Vec<String>),
}

impl JobBody {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Worker(_) => "worker",
            Self::Text(_) => "text",
            Self::Choice(_) => "choice",
            Self::Constant(_) => "constant",
        }
    }
}

/// Static job definition
#[derive(Clone)]
pub struct JobSpec {
    pub(crate) name: Arc<str>,
    pub(crate) label: String,
    pub(crate) prejobs: Vec<Arc<str>>,
    pub(crate) reads: Vec<Arc<str>>,
    pub(crate) condition: Option<Check>,
    pub(crate) body: JobBody,
    pub(crate) validator: Option<Validator>,
    pub(crate) normalizer: Option<Normalizer>,
    pub(crate) catch: FxHashSet<ErrorKind>,
    pub(crate) nonfatal: FxHashSet<ErrorKind>,
    pub(crate) no_output_is_ok: bool,
    pub(crate) autofinish: bool,
    pub(crate) ignore_cache: bool,
    pub(crate) cache_id: Option<String>,
}

impl JobSpec {
    pub fn new(name: impl Into<Arc<str>>, body: JobBody) -> Self {
        let name = name.into();
        Self {
            label: name.to_string(),
            name,
            prejobs: Vec::new(),
            reads: Vec::new(),
            condition: None,
            body,
            validator: None,
            normalizer: None,
            catch: FxHashSet::default(),
            nonfatal: FxHashSet::default(),
            no_output_is_ok: false,
            autofinish: false,
            ignore_cache: false,
            cache_id: None,
        }
    }

    pub fn worker(name: impl Into<Arc<str>>, worker: impl Worker + 'static) -> Self {
        Self::new(name, JobBody::Worker(Arc::new(worker)))
    }

    /// Worker from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::worker(name, FnWorker(f))
    }

    pub fn text(name: impl Into<Arc<str>>, field: TextField) -> Self {
        Self::new(name, JobBody::Text(field))
    }

    pub fn choice(name: impl Into<Arc<str>>, field: ChoiceField) -> Self {
        Self::new(name, JobBody::Choice(field))
    }

    pub fn constant<I, S>(name: impl Into<Arc<str>>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            JobBody::Constant(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn prejobs<I, S>(mut self, prejobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prejobs
            .extend(prejobs.into_iter().map(|p| Arc::from(p.as_ref())));
        self
    }

    /// Upstream jobs whose FINISHED output this job needs
    pub fn reads<I, S>(mut self, reads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.reads
            .extend(reads.into_iter().map(|r| Arc::from(r.as_ref())));
        self
    }

    pub fn when(mut self, check: Check) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => Check::All(vec![existing, check]),
            None => check,
        });
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(f));
        self
    }

    pub fn normalizer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.normalizer = Some(Arc::new(f));
        self
    }

    /// Error kinds that degrade the job instead of failing it
    pub fn catch(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.catch.extend(kinds);
        self
    }

    /// Error kinds tolerated while pre-filling a field
    pub fn nonfatal(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.nonfatal.extend(kinds);
        self
    }

    pub fn no_output_is_ok(mut self, ok: bool) -> Self {
        self.no_output_is_ok = ok;
        self
    }

    pub fn autofinish(mut self, autofinish: bool) -> Self {
        self.autofinish = autofinish;
        self
    }

    pub fn ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }

    pub fn cache_id(mut self, id: impl Into<String>) -> Self {
        self.cache_id = Some(id.into());
        self
    }

    // ═══════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn label_text(&self) -> &str {
        &self.label
    }

    pub fn prejob_names(&self) -> &[Arc<str>] {
        &self.prejobs
    }

    pub fn read_names(&self) -> &[Arc<str>] {
        &self.reads
    }

    pub fn condition(&self) -> Option<&Check> {
        self.condition.as_ref()
    }

    pub fn body(&self) -> &JobBody {
        &self.body
    }

    pub fn catches(&self, kind: ErrorKind) -> bool {
        self.catch.contains(&kind)
    }

    /// A caught error finishes the job with its output cleared
    pub fn may_degrade(&self) -> bool {
        !self.catch.is_empty()
    }

    pub fn tolerates(&self, kind: ErrorKind) -> bool {
        self.nonfatal.contains(&kind)
    }

    pub fn is_no_output_ok(&self) -> bool {
        self.no_output_is_ok
    }

    pub fn is_autofinish(&self) -> bool {
        self.autofinish
    }

    pub fn ignores_cache(&self) -> bool {
        self.ignore_cache
    }

    pub fn cache_id_text(&self) -> Option<&str> {
        self.cache_id.as_deref()
    }

    /// Apply the normalizer, if any
    pub fn normalize(&self, text: &str) -> String {
        match &self.normalizer {
            Some(normalize) => normalize(text),
            None => text.to_string(),
        }
    }

    /// Apply the validator, if any
    pub fn validate(&self, text: &str) -> Result<()> {
        match &self.validator {
            Some(validate) => validate(text),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("body", &self.body.kind())
            .field("prejobs", &self.prejobs)
            .field("reads", &self.reads)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}
