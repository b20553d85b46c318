//! RunReport - what a finished run leaves behind

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobState};
use crate::pipeline::Pipeline;

/// Outcome of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub label: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub output: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default)]
    pub cached: bool,
}

impl JobReport {
    pub fn from_job(job: &Job) -> Self {
        Self {
            name: job.name().to_string(),
            label: job.label().to_string(),
            state: job.state(),
            exit_code: job.exit_code(),
            output: job.output(),
            warnings: job.warnings(),
            errors: job.errors(),
            degraded: job.is_degraded(),
            cached: job.is_cached(),
        }
    }
}

/// Outcome of a whole run, jobs in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    pub submission_ok: bool,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn collect(pipeline: &Pipeline, duration: Duration) -> Self {
        Self {
            jobs: pipeline.jobs().map(|job| JobReport::from_job(job)).collect(),
            submission_ok: pipeline.submission_ok(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|job| job.state == JobState::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|job| job.state == JobState::Skipped)
    }
}
