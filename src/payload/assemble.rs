//! Payload Assembler
//!
//! A [`PayloadPlan`] is a list of common field rules plus an optional branch.
//! Assembly evaluates the common rules, decides the branch fact once, then
//! merges exactly one fragment over the common fields (fragment keys win).
//! Assembly only reads: it is a pure function of job outputs and options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::{is_truthy, Options};
use crate::contrib::{self, ContributorColumn};
use crate::error::{ConvoyError, Result};
use crate::payload::Harvester;

/// Ordered key/value map of payload fields
pub type Fragment = Map<String, Value>;

/// Where a field's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum FieldSource {
    /// The `index`-th output of a FINISHED job
    Output {
        job: String,
        #[serde(default)]
        index: usize,
    },
    /// Like `Output`, with a default for skipped jobs and missing indexes
    OutputOr {
        job: String,
        #[serde(default)]
        index: usize,
        #[serde(default)]
        default: String,
    },
    /// Every output as an array (empty if the job did not finish)
    Outputs { job: String },
    /// A named attribute of a FINISHED job
    Attribute { job: String, name: String },
    /// An options value
    #[serde(rename = "option")]
    OptionValue {
        option: String,
        #[serde(default)]
        default: Option<Value>,
    },
    Constant { value: Value },
    /// Boolean attribute mapped to `"1"` or null
    Flag { job: String, name: String },
    /// One column of parsed contributor lines; omitted when there are none
    Contributors {
        job: String,
        column: ContributorColumn,
    },
}

impl FieldSource {
    /// Evaluate to a value, or `None` to omit the key
    pub fn evaluate(&self, harvester: &Harvester<'_>, options: &Options) -> Result<Option<Value>> {
        Ok(Some(match self {
            Self::Output { job, index } => Value::String(harvester.get_job_output(job, *index)?),
            Self::OutputOr {
                job,
                index,
                default,
            } => Value::String(harvester.get_job_output_or(job, *index, default.as_str())?),
            Self::Outputs { job } => Value::from(harvester.get_job_outputs_or(job, Vec::new())?),
            Self::Attribute { job, name } => harvester.get_job_attribute(job, name)?,
            Self::OptionValue { option, default } => match (options.value(option), default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => return Err(ConvoyError::MissingOption { key: option.clone() }),
            },
            Self::Constant { value } => value.clone(),
            Self::Flag { job, name } => {
                if is_truthy(&harvester.get_job_attribute_or(job, name, Value::Bool(false))?) {
                    Value::from("1")
                } else {
                    Value::Null
                }
            }
            Self::Contributors { job, column } => {
                let lines = harvester.get_job_outputs_or(job, Vec::new())?;
                let contributors = contrib::parse_lines(&lines)?;
                if contributors.is_empty() {
                    return Ok(None);
                }
                contrib::column(&contributors, *column)
            }
        }))
    }
}

/// One payload key and its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub key: String,
    #[serde(flatten)]
    pub source: FieldSource,
}

impl FieldRule {
    pub fn new(key: impl Into<String>, source: FieldSource) -> Self {
        Self {
            key: key.into(),
            source,
        }
    }
}

/// The single run-time fact a branch switches on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchFact {
    /// The job FINISHED with a non-empty first output; it must be FINISHED
    OutputPresent { job: String },
    /// An option is truthy
    OptionSet { option: String },
}

impl BranchFact {
    pub fn evaluate(&self, harvester: &Harvester<'_>, options: &Options) -> Result<bool> {
        match self {
            Self::OutputPresent { job } => {
                if !harvester.is_finished(job)? {
                    return Err(ConvoyError::JobNotFinished { job: job.clone() });
                }
                Ok(!harvester.get_job_output_or(job, 0, "")?.trim().is_empty())
            }
            Self::OptionSet { option } => Ok(options.flag(option)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub exists_when: BranchFact,
    #[serde(default)]
    pub existing: Vec<FieldRule>,
    #[serde(default)]
    pub new: Vec<FieldRule>,
}

impl Branch {
    pub fn on(fact: BranchFact) -> Self {
        Self {
            exists_when: fact,
            existing: Vec::new(),
            new: Vec::new(),
        }
    }

    pub fn when_exists(mut self, key: impl Into<String>, source: FieldSource) -> Self {
        self.existing.push(FieldRule::new(key, source));
        self
    }

    pub fn when_new(mut self, key: impl Into<String>, source: FieldSource) -> Self {
        self.new.push(FieldRule::new(key, source));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchTaken {
    Existing,
    New,
}

/// Assembled submission payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub fields: Fragment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchTaken>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadPlan {
    #[serde(default)]
    pub common: Vec<FieldRule>,
    #[serde(default)]
    pub branch: Option<Branch>,
}

impl PayloadPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, source: FieldSource) -> Self {
        self.common.push(FieldRule::new(key, source));
        self
    }

    pub fn branch(mut self, branch: Branch) -> Self {
        self.branch = Some(branch);
        self
    }

    /// Jobs any rule or the branch fact reads
    pub fn referenced_jobs(&self) -> Vec<&str> {
        let rules = self
            .common
            .iter()
            .chain(self.branch.iter().flat_map(|b| b.existing.iter().chain(&b.new)));
        let mut jobs: Vec<&str> = rules
            .filter_map(|rule| match &rule.source {
                FieldSource::Output { job, .. }
                | FieldSource::OutputOr { job, .. }
                | FieldSource::Outputs { job }
                | FieldSource::Attribute { job, .. }
                | FieldSource::Flag { job, .. }
                | FieldSource::Contributors { job, .. } => Some(job.as_str()),
                FieldSource::OptionValue { .. } | FieldSource::Constant { .. } => None,
            })
            .collect();
        if let Some(BranchFact::OutputPresent { job }) = self.branch.as_ref().map(|b| &b.exists_when) {
            jobs.push(job);
        }
        jobs.sort_unstable();
        jobs.dedup();
        jobs
    }

    pub fn assemble(&self, harvester: &Harvester<'_>, options: &Options) -> Result<Payload> {
        let mut fields = Fragment::new();
        apply(&self.common, harvester, options, &mut fields)?;

        let branch = match &self.branch {
            Some(branch) => {
                let exists = branch.exists_when.evaluate(harvester, options)?;
                let (rules, taken) = if exists {
                    (&branch.existing, BranchTaken::Existing)
                } else {
                    (&branch.new, BranchTaken::New)
                };
                apply(rules, harvester, options, &mut fields)?;
                Some(taken)
            }
            None => None,
        };

        Ok(Payload { fields, branch })
    }
}

fn apply(
    rules: &[FieldRule],
    harvester: &Harvester<'_>,
    options: &Options,
    fields: &mut Fragment,
) -> Result<()> {
    for rule in rules {
        if let Some(value) = rule.source.evaluate(harvester, options)? {
            fields.insert(rule.key.clone(), value);
        }
    }
    Ok(())
}
