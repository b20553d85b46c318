//! Pipeline - the ordered registry of jobs for one run
//!
//! Built once by [`PipelineBuilder`]: names are validated, the prejob graph
//! is checked for unknown names and cycles, `reads` are checked against the
//! graph, and only the jobs of this run are constructed. With
//! `options.isolate` set that is the target's dependency closure; otherwise
//! every declared job.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::Options;
use crate::dag::{validate_job_name, validate_reads, JobGraph};
use crate::error::{ConvoyError, Result};
use crate::job::{make_precondition, Job, JobSpec, JobState, JobTable, RunSet};
use crate::payload::Harvester;

/// Collects job specs and builds a [`Pipeline`]
#[derive(Debug)]
pub struct PipelineBuilder {
    options: Options,
    specs: Vec<JobSpec>,
}

impl PipelineBuilder {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            specs: Vec::new(),
        }
    }

    /// Declare one job; declaration order is kept
    pub fn job(mut self, spec: JobSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn jobs(mut self, specs: impl IntoIterator<Item = JobSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Validate the declarations and construct the jobs of this run
    pub fn build(self) -> Result<Pipeline> {
        let Self { options, specs } = self;

        for spec in &specs {
            validate_job_name(spec.name())?;
        }

        let graph = JobGraph::build(specs.iter().map(|s| (s.name(), s.prejob_names())))?;
        graph.detect_cycles()?;
        validate_reads(&specs, &graph)?;

        let isolated_jobs = match options.isolate.as_deref() {
            Some(target) => graph.job_and_dependencies(target, &[])?,
            None => Vec::new(),
        };
        let wanted: Option<FxHashSet<&str>> = (!isolated_jobs.is_empty())
            .then(|| isolated_jobs.iter().map(|name| name.as_ref()).collect());

        let jobs_before_upload: Vec<Arc<str>> = graph
            .names()
            .iter()
            .filter(|name| wanted.as_ref().is_none_or(|w| w.contains(name.as_ref())))
            .cloned()
            .collect();

        let run = RunSet {
            jobs_before_upload: &jobs_before_upload,
            isolated_jobs: &isolated_jobs,
        };

        let mut table = JobTable::default();
        for spec in specs {
            let name = Arc::clone(spec.name());
            if !jobs_before_upload.contains(&name) {
                debug!(job = %name, "not part of this run");
                continue;
            }
            let precondition = make_precondition(&name, spec.condition().cloned(), run);
            let upstream = graph.upstream(&name);
            table.insert(name, Arc::new(Job::new(spec, precondition, upstream)));
        }

        debug!(
            jobs = table.len(),
            isolated = !isolated_jobs.is_empty(),
            "pipeline built"
        );

        Ok(Pipeline {
            options: Arc::new(options),
            graph,
            table: Arc::new(table),
            jobs_before_upload,
            isolated_jobs,
        })
    }
}

/// Constructed jobs plus their derived views
pub struct Pipeline {
    options: Arc<Options>,
    graph: JobGraph,
    table: Arc<JobTable>,
    jobs_before_upload: Vec<Arc<str>>,
    isolated_jobs: Vec<Arc<str>>,
}

impl Pipeline {
    pub fn builder(options: Options) -> PipelineBuilder {
        PipelineBuilder::new(options)
    }

    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub(crate) fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    pub fn job(&self, name: &str) -> Option<&Arc<Job>> {
        self.table.get(name)
    }

    /// Constructed jobs, in declaration order
    pub fn jobs_before_upload(&self) -> &[Arc<str>] {
        &self.jobs_before_upload
    }

    /// Dependency closure of `options.isolate`, target last; empty if unset
    pub fn isolated_jobs(&self) -> &[Arc<str>] {
        &self.isolated_jobs
    }

    pub fn is_isolated(&self) -> bool {
        !self.isolated_jobs.is_empty()
    }

    /// The jobs the runner executes
    pub fn jobs_to_run(&self) -> &[Arc<str>] {
        if self.isolated_jobs.is_empty() {
            &self.jobs_before_upload
        } else {
            &self.isolated_jobs
        }
    }

    /// Jobs of this run in declaration order
    pub fn jobs(&self) -> impl Iterator<Item = &Arc<Job>> {
        self.jobs_before_upload
            .iter()
            .filter_map(|name| self.table.get(name))
    }

    /// Ordered closure of `job` (see [`JobGraph::job_and_dependencies`]),
    /// limited to jobs constructed for this run
    pub fn get_job_and_dependencies(&self, job: &str, extra: &[&str]) -> Result<Vec<Arc<Job>>> {
        if !self.table.contains_key(job) {
            return Err(ConvoyError::UnknownJob {
                name: job.to_string(),
            });
        }
        Ok(self
            .graph
            .job_and_dependencies(job, extra)?
            .iter()
            .filter_map(|name| self.table.get(name).cloned())
            .collect())
    }

    /// Unrestricted read-only view over every job
    pub fn harvester(&self) -> Harvester<'_> {
        Harvester::new(&self.table)
    }

    /// Whether the outputs can be submitted.
    ///
    /// False for isolated runs and empty pipelines. Otherwise every job that
    /// was not SKIPPED must have exit code 0.
    pub fn submission_ok(&self) -> bool {
        if self.is_isolated() || self.jobs_before_upload.is_empty() {
            return false;
        }
        self.jobs()
            .all(|job| job.state() == JobState::Skipped || job.exit_code() == Some(0))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("jobs_before_upload", &self.jobs_before_upload)
            .field("isolated_jobs", &self.isolated_jobs)
            .finish_non_exhaustive()
    }
}
