//! Plan - declarative YAML description of a pipeline
//!
//! ```yaml
//! name: movie
//! jobs:
//!   - name: title
//!     text:
//!       question: "Title:"
//!       normalize: [trim, collapse_whitespace]
//!   - name: year
//!     prejobs: [title]
//!     text: { question: "Year:", pattern: "^[0-9]{4}$" }
//!   - name: type
//!     choice: { question: "Type?", options: [Movie, Season, Episode] }
//!   - name: group_id
//!     when: has_group
//!     constant: { value: "1234" }
//! payload:
//!   common:
//!     - { key: title, from: output, job: title }
//!   branch:
//!     exists_when: { option: has_group }
//!     existing:
//!       - { key: groupid, from: output, job: group_id }
//!     new:
//!       - { key: year, from: output_or, job: year }
//! ```
//!
//! Each job has exactly one of `text`, `choice` or `constant`.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Options;
use crate::error::{ConvoyError, ErrorKind, Result};
use crate::job::{Check, ChoiceField, JobSpec, TextField};
use crate::payload::PayloadPlan;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::prompt::ChoiceOption;

/// Parsed plan file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Plan {
    pub name: String,
    #[serde(default)]
    pub jobs: Vec<JobDef>,
    #[serde(default)]
    pub payload: PayloadPlan,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobDef {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub prejobs: Vec<String>,
    #[serde(default)]
    pub reads: Vec<String>,
    /// Run only if this option is truthy
    #[serde(default)]
    pub when: Option<String>,
    /// Skip if this job produced a non-empty first output (added to prejobs)
    #[serde(default)]
    pub unless_exists: Option<String>,
    #[serde(default)]
    pub autofinish: bool,
    #[serde(default)]
    pub no_output_is_ok: bool,
    #[serde(default)]
    pub ignore_cache: bool,
    #[serde(default)]
    pub cache_id: Option<String>,
    #[serde(default)]
    pub catch: Vec<ErrorKind>,
    #[serde(default)]
    pub nonfatal: Vec<ErrorKind>,
    #[serde(flatten)]
    pub kind: JobKindDef,
}

/// The 3 job kinds - serde detects which one from its key
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum JobKindDef {
    Text { text: TextDef },
    Choice { choice: ChoiceDef },
    Constant { constant: ConstantDef },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextDef {
    pub question: String,
    #[serde(default)]
    pub default: Option<String>,
    /// Regex the answer must match
    #[serde(default)]
    pub pattern: Option<String>,
    /// Normalizations applied in order before validation
    #[serde(default)]
    pub normalize: Vec<Normalize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalize {
    Trim,
    Lowercase,
    CollapseWhitespace,
}

impl Normalize {
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Trim => text.trim().to_string(),
            Self::Lowercase => text.to_lowercase(),
            Self::CollapseWhitespace => text.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChoiceDef {
    pub question: String,
    pub options: Vec<OptionDef>,
    /// Label or value of the focused option
    #[serde(default)]
    pub default: Option<String>,
}

/// A bare label (its own value) or an explicit pair
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OptionDef {
    Label(String),
    Pair { label: String, value: Value },
}

impl From<&OptionDef> for ChoiceOption {
    fn from(def: &OptionDef) -> Self {
        match def {
            OptionDef::Label(label) => ChoiceOption::new(label.clone(), label.clone()),
            OptionDef::Pair { label, value } => ChoiceOption::new(label.clone(), value.clone()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConstantDef {
    pub value: OneOrMany,
}

/// Handles string OR array for constant values
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

impl Plan {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ConvoyError::PlanParse {
            details: e.to_string(),
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Compile job definitions into specs, in declaration order
    pub fn job_specs(&self) -> Result<Vec<JobSpec>> {
        self.jobs.iter().map(JobDef::to_spec).collect()
    }

    /// Build the pipeline for `options` and check the payload only reads
    /// declared jobs
    pub fn into_pipeline(self, options: Options) -> Result<(Pipeline, PayloadPlan)> {
        let specs = self.job_specs()?;
        for job in self.payload.referenced_jobs() {
            if !specs.iter().any(|spec| spec.name().as_ref() == job) {
                return Err(ConvoyError::UnknownJob {
                    name: job.to_string(),
                });
            }
        }
        let pipeline = PipelineBuilder::new(options).jobs(specs).build()?;
        Ok((pipeline, self.payload))
    }
}

impl JobDef {
    pub fn to_spec(&self) -> Result<JobSpec> {
        let mut spec = match &self.kind {
            JobKindDef::Text { text } => text_spec(&self.name, text)?,
            JobKindDef::Choice { choice } => {
                let mut field = ChoiceField::new(
                    choice.question.clone(),
                    choice.options.iter().map(ChoiceOption::from),
                );
                if let Some(default) = &choice.default {
                    field = field.focus(default);
                }
                JobSpec::choice(self.name.as_str(), field)
            }
            JobKindDef::Constant { constant } => {
                JobSpec::constant(self.name.as_str(), constant.value.to_vec())
            }
        };

        let mut prejobs = self.prejobs.clone();
        if let Some(job) = &self.unless_exists {
            if !prejobs.contains(job) {
                prejobs.push(job.clone());
            }
            spec = spec.when(Check::output_present(job.clone()).negate());
        }
        if let Some(option) = &self.when {
            spec = spec.when(Check::option(option.clone()));
        }
        if let Some(label) = &self.label {
            spec = spec.label(label.clone());
        }
        if let Some(id) = &self.cache_id {
            spec = spec.cache_id(id.clone());
        }

        Ok(spec
            .prejobs(&prejobs)
            .reads(&self.reads)
            .autofinish(self.autofinish)
            .no_output_is_ok(self.no_output_is_ok)
            .ignore_cache(self.ignore_cache)
            .catch(self.catch.iter().copied())
            .nonfatal(self.nonfatal.iter().copied()))
    }
}

fn text_spec(name: &str, def: &TextDef) -> Result<JobSpec> {
    let mut field = TextField::new(def.question.clone());
    if let Some(default) = &def.default {
        field = field.default_text(default.clone());
    }
    let mut spec = JobSpec::text(name, field);

    if !def.normalize.is_empty() {
        let steps = def.normalize.clone();
        spec = spec.normalizer(move |text| {
            steps
                .iter()
                .fold(text.to_string(), |acc, step| step.apply(&acc))
        });
    }

    if let Some(pattern) = &def.pattern {
        let re = Regex::new(pattern).map_err(|e| ConvoyError::PlanParse {
            details: format!("job '{}': invalid pattern: {}", name, e),
        })?;
        let pattern = pattern.clone();
        spec = spec.validator(move |text| {
            if re.is_match(text) {
                Ok(())
            } else {
                Err(ConvoyError::validation(format!("Must match {}", pattern)))
            }
        });
    }

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobBody;
    use crate::payload::BranchTaken;
    use crate::prompt::ScriptedPresenter;
    use crate::runtime::Runner;
    use std::sync::Arc;

    const PLAN: &str = r#"
name: movie
jobs:
  - name: title
    label: Title
    text:
      question: "Title:"
      normalize: [trim, collapse_whitespace]
  - name: year
    prejobs: [title]
    reads: [title]
    text: { question: "Year:", pattern: "^[0-9]{4}$" }
  - name: type
    choice:
      question: "Type?"
      options: [Movie, { label: Season, value: season }]
      default: season
  - name: group_id
    when: has_group
    constant: { value: "1234" }
  - name: description
    unless_exists: group_id
    catch: [request]
    constant: { value: [a, b] }
payload:
  common:
    - { key: title, from: output, job: title }
  branch:
    exists_when: { option: has_group }
    existing:
      - { key: groupid, from: output, job: group_id }
    new:
      - { key: year, from: output_or, job: year }
"#;

    #[test]
    fn test_parse_plan() {
        let plan = Plan::from_yaml(PLAN).unwrap();
        assert_eq!(plan.name, "movie");
        assert_eq!(plan.jobs.len(), 5);
        assert!(matches!(plan.jobs[2].kind, JobKindDef::Choice { .. }));
        assert_eq!(plan.payload.referenced_jobs(), vec!["group_id", "title", "year"]);
    }

    #[test]
    fn test_job_specs() {
        let specs = Plan::from_yaml(PLAN).unwrap().job_specs().unwrap();

        let title = &specs[0];
        assert_eq!(title.label_text(), "Title");
        assert_eq!(title.normalize("  The   Matrix "), "The Matrix");

        let year = &specs[1];
        assert!(year.validate("1999").is_ok());
        let err = year.validate("99").unwrap_err();
        assert_eq!(err.to_string(), "[CONVOY-043] Must match ^[0-9]{4}$");

        assert!(specs[3].condition().is_some());
        assert!(matches!(specs[3].body(), JobBody::Constant(v) if v == &["1234"]));

        let description = &specs[4];
        assert_eq!(description.prejob_names()[0].as_ref(), "group_id");
        assert!(description.catches(ErrorKind::Request));
    }

    #[test]
    fn test_into_pipeline() {
        let (pipeline, payload) = Plan::from_yaml(PLAN)
            .unwrap()
            .into_pipeline(Options::default())
            .unwrap();
        assert_eq!(pipeline.jobs_before_upload().len(), 5);
        assert!(payload.branch.is_some());
    }

    #[tokio::test]
    async fn test_plan_without_group_takes_new_branch() {
        let (pipeline, payload_plan) = Plan::from_yaml(PLAN)
            .unwrap()
            .into_pipeline(Options::default())
            .unwrap();
        let presenter = ScriptedPresenter::new(Vec::<String>::new())
            .with_job_answers("title", ["The Matrix"])
            .with_job_answers("year", ["1999"])
            .with_job_answers("type", ["Season"]);
        let runner = Runner::new(pipeline);
        runner.run(Arc::new(presenter)).await.unwrap();

        let pipeline = runner.pipeline();
        let payload = payload_plan
            .assemble(&pipeline.harvester(), pipeline.options())
            .unwrap();
        assert_eq!(payload.branch, Some(BranchTaken::New));
        assert_eq!(payload.fields.get("year"), Some(&Value::from("1999")));
        assert!(!payload.fields.contains_key("groupid"));
    }

    #[test]
    fn test_payload_must_reference_declared_jobs() {
        let yaml = r#"
name: broken
jobs:
  - { name: a, constant: { value: x } }
payload:
  common:
    - { key: b, from: output, job: ghost }
"#;
        let err = Plan::from_yaml(yaml)
            .unwrap()
            .into_pipeline(Options::default())
            .unwrap_err();
        assert!(matches!(err, ConvoyError::UnknownJob { name } if name == "ghost"));
    }

    #[test]
    fn test_invalid_pattern() {
        let yaml = r#"
name: broken
jobs:
  - { name: a, text: { question: "Q", pattern: "([" } }
"#;
        let err = Plan::from_yaml(yaml).unwrap().job_specs().unwrap_err();
        assert_eq!(err.code(), "CONVOY-002");
    }

    #[test]
    fn test_unknown_job_kind_is_parse_error() {
        let yaml = "name: x\njobs:\n  - { name: a, shell: ls }\n";
        assert!(matches!(
            Plan::from_yaml(yaml).unwrap_err(),
            ConvoyError::PlanParse { .. }
        ));
    }
}
