//! Harvester - read-only access to job outputs and attributes
//!
//! Strict reads fail on jobs that are not FINISHED (a fatal programming
//! error) and on missing indexes. The `_or` variants return the caller's
//! default instead, which is how skipped or empty jobs are tolerated.
//!
//! A scoped harvester (handed to workers) additionally rejects reads of jobs
//! outside the reader's upstream.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::error::{ConvoyError, Result};
use crate::job::{Job, JobState, JobTable};

#[derive(Clone, Copy)]
pub struct Harvester<'a> {
    jobs: &'a JobTable,
    scope: Option<(&'a str, &'a FxHashSet<Arc<str>>)>,
}

impl<'a> Harvester<'a> {
    /// Unrestricted view over every constructed job
    pub fn new(jobs: &'a JobTable) -> Self {
        Self { jobs, scope: None }
    }

    /// View restricted to `upstream`, reporting violations against `reader`
    pub fn scoped(jobs: &'a JobTable, reader: &'a str, upstream: &'a FxHashSet<Arc<str>>) -> Self {
        Self {
            jobs,
            scope: Some((reader, upstream)),
        }
    }

    fn lookup(&self, name: &str) -> Result<&'a Arc<Job>> {
        if let Some((reader, upstream)) = self.scope {
            if !upstream.contains(name) {
                return Err(ConvoyError::UndeclaredRead {
                    job: reader.to_string(),
                    read: name.to_string(),
                });
            }
        }
        self.jobs.get(name).ok_or_else(|| ConvoyError::UnknownJob {
            name: name.to_string(),
        })
    }

    fn finished(&self, name: &str) -> Result<&'a Arc<Job>> {
        let job = self.lookup(name)?;
        if job.is_finished() {
            Ok(job)
        } else {
            Err(ConvoyError::JobNotFinished {
                job: name.to_string(),
            })
        }
    }

    pub fn state(&self, name: &str) -> Result<JobState> {
        Ok(self.lookup(name)?.state())
    }

    pub fn is_finished(&self, name: &str) -> Result<bool> {
        Ok(self.lookup(name)?.is_finished())
    }

    /// The `index`-th output of a FINISHED job
    pub fn get_job_output(&self, name: &str, index: usize) -> Result<String> {
        let job = self.finished(name)?;
        let output = job.output();
        let len = output.len();
        output
            .into_iter()
            .nth(index)
            .ok_or_else(|| ConvoyError::InsufficientOutput {
                job: name.to_string(),
                index,
                len,
            })
    }

    /// Like [`get_job_output`](Self::get_job_output), but unfinished jobs and
    /// missing indexes yield `default`
    pub fn get_job_output_or(
        &self,
        name: &str,
        index: usize,
        default: impl Into<String>,
    ) -> Result<String> {
        let job = self.lookup(name)?;
        if !job.is_finished() {
            return Ok(default.into());
        }
        Ok(job
            .output()
            .into_iter()
            .nth(index)
            .unwrap_or_else(|| default.into()))
    }

    /// Every output of a FINISHED job
    pub fn get_job_outputs(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.finished(name)?.output())
    }

    pub fn get_job_outputs_or(&self, name: &str, default: Vec<String>) -> Result<Vec<String>> {
        let job = self.lookup(name)?;
        Ok(if job.is_finished() {
            job.output()
        } else {
            default
        })
    }

    /// Named attribute of a FINISHED job
    pub fn get_job_attribute(&self, name: &str, attribute: &str) -> Result<Value> {
        self.finished(name)?
            .attribute(attribute)
            .ok_or_else(|| ConvoyError::UnknownAttribute {
                job: name.to_string(),
                attribute: attribute.to_string(),
            })
    }

    pub fn get_job_attribute_or(&self, name: &str, attribute: &str, default: Value) -> Result<Value> {
        let job = self.lookup(name)?;
        if !job.is_finished() {
            return Ok(default);
        }
        Ok(job.attribute(attribute).unwrap_or(default))
    }
}

impl std::fmt::Debug for Harvester<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvester")
            .field("jobs", &self.jobs.len())
            .field("scoped", &self.scope.map(|(reader, _)| reader))
            .finish()
    }
}
