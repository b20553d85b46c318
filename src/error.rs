// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Convoy Error Types with Error Codes
//!
//! Error code ranges:
//! - CONVOY-000-009: Configuration and plan errors
//! - CONVOY-010-019: Graph construction errors
//! - CONVOY-020-029: Job state and harvesting errors
//! - CONVOY-030-039: Prompt protocol errors
//! - CONVOY-040-049: Collaborator and worker errors
//! - CONVOY-050-059: Payload errors
//! - CONVOY-060-069: Run control errors
//! - CONVOY-090-099: IO/serialization errors
//!
//! Every variant maps to an [`ErrorKind`]. Jobs declare `catch` and `nonfatal`
//! policies as sets of kinds, so recovery never depends on message text.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConvoyError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Coarse error classification used by per-job recovery policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Graph,
    State,
    Prompt,
    NotFound,
    Request,
    Inspection,
    Validation,
    Worker,
    Payload,
    Cancelled,
    Io,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Graph => "graph",
            Self::State => "state",
            Self::Prompt => "prompt",
            Self::NotFound => "not_found",
            Self::Request => "request",
            Self::Inspection => "inspection",
            Self::Validation => "validation",
            Self::Worker => "worker",
            Self::Payload => "payload",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
pub enum ConvoyError {
    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-001] Invalid configuration: {reason}")]
    #[diagnostic(code(convoy::config_error))]
    ConfigError { reason: String },

    #[error("[CONVOY-002] Failed to parse plan: {details}")]
    #[diagnostic(
        code(convoy::plan_parse),
        help("Check YAML syntax: indentation and quoting")
    )]
    PlanParse { details: String },

    // ═══════════════════════════════════════════
    // GRAPH ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-010] Invalid job name '{name}': {reason}")]
    #[diagnostic(code(convoy::invalid_job_name))]
    InvalidJobName { name: String, reason: String },

    #[error("[CONVOY-011] Duplicate job name: {name}")]
    #[diagnostic(code(convoy::duplicate_job))]
    DuplicateJob { name: String },

    #[error("[CONVOY-012] Job '{job}' depends on unknown job '{dep}'")]
    #[diagnostic(code(convoy::missing_dependency))]
    MissingDependency { job: String, dep: String },

    #[error("[CONVOY-013] Circular dependency detected: {cycle}")]
    #[diagnostic(
        code(convoy::cycle_detected),
        help("Remove one of the prejob edges on the cycle")
    )]
    CycleDetected { cycle: String },

    #[error("[CONVOY-014] Job '{job}' reads '{read}' which is not upstream")]
    #[diagnostic(code(convoy::read_not_upstream))]
    ReadNotUpstream { job: String, read: String },

    #[error("[CONVOY-015] Job '{job}' reads '{read}' which may be skipped or finish without output")]
    #[diagnostic(code(convoy::read_skippable))]
    ReadSkippable { job: String, read: String },

    #[error("[CONVOY-016] Unknown job: {name}")]
    #[diagnostic(code(convoy::unknown_job))]
    UnknownJob { name: String },

    // ═══════════════════════════════════════════
    // JOB STATE ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-020] Cannot get output from unfinished job: {job}")]
    #[diagnostic(code(convoy::job_not_finished))]
    JobNotFinished { job: String },

    #[error("[CONVOY-021] Job finished with insufficient output: {job}: index {index} of {len}")]
    #[diagnostic(code(convoy::insufficient_output))]
    InsufficientOutput { job: String, index: usize, len: usize },

    #[error("[CONVOY-022] Job '{job}' has no attribute '{attribute}'")]
    #[diagnostic(code(convoy::unknown_attribute))]
    UnknownAttribute { job: String, attribute: String },

    #[error("[CONVOY-023] Illegal state transition for job '{job}': {from} -> {to}")]
    #[diagnostic(code(convoy::illegal_transition))]
    IllegalTransition { job: String, from: String, to: String },

    #[error("[CONVOY-024] Job '{job}' reads '{read}' without depending on it")]
    #[diagnostic(code(convoy::undeclared_read))]
    UndeclaredRead { job: String, read: String },

    // ═══════════════════════════════════════════
    // PROMPT ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-030] Cannot {action} while job '{job}' is {state}")]
    #[diagnostic(code(convoy::not_running))]
    NotRunning {
        job: String,
        action: String,
        state: String,
    },

    #[error("[CONVOY-031] Prompt for job '{job}' was dropped without an answer")]
    #[diagnostic(code(convoy::prompt_dropped))]
    PromptDropped { job: String },

    #[error("[CONVOY-032] Invalid answer for job '{job}': {reason}")]
    #[diagnostic(code(convoy::invalid_answer))]
    InvalidAnswer { job: String, reason: String },

    // ═══════════════════════════════════════════
    // COLLABORATOR ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-040] Not found: {query}")]
    #[diagnostic(code(convoy::requested_not_found))]
    RequestedNotFound { query: String },

    #[error("[CONVOY-041] Request failed: {reason}")]
    #[diagnostic(code(convoy::request_failed))]
    RequestFailed { reason: String },

    #[error("[CONVOY-042] Content inspection failed: {reason}")]
    #[diagnostic(code(convoy::inspection_failed))]
    InspectionFailed { reason: String },

    #[error("[CONVOY-043] {reason}")]
    #[diagnostic(code(convoy::validation))]
    Validation { reason: String },

    #[error("[CONVOY-044] Job '{job}' failed: {reason}")]
    #[diagnostic(code(convoy::worker_failed))]
    WorkerFailed { job: String, reason: String },

    // ═══════════════════════════════════════════
    // PAYLOAD ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-050] Unexpected line: {line}")]
    #[diagnostic(code(convoy::unexpected_line))]
    UnexpectedLine { line: String },

    #[error("[CONVOY-051] Option '{key}' is not set")]
    #[diagnostic(code(convoy::missing_option))]
    MissingOption { key: String },

    // ═══════════════════════════════════════════
    // RUN CONTROL ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-060] Run was cancelled")]
    #[diagnostic(code(convoy::cancelled))]
    Cancelled,

    #[error("[CONVOY-061] Job task panicked: {details}")]
    #[diagnostic(code(convoy::task_panicked))]
    TaskPanicked { details: String },

    // ═══════════════════════════════════════════
    // IO/SERIALIZATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[CONVOY-090] IO error: {0}")]
    #[diagnostic(code(convoy::io_error))]
    Io(#[from] std::io::Error),

    #[error("[CONVOY-091] JSON error: {0}")]
    #[diagnostic(code(convoy::json_error))]
    Json(#[from] serde_json::Error),

    #[error("[CONVOY-092] YAML parse error: {0}")]
    #[diagnostic(code(convoy::yaml_error))]
    YamlParse(#[from] serde_yaml::Error),
}

impl ConvoyError {
    /// Get the error code (e.g., "CONVOY-013")
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError { .. } => "CONVOY-001",
            Self::PlanParse { .. } => "CONVOY-002",
            Self::InvalidJobName { .. } => "CONVOY-010",
            Self::DuplicateJob { .. } => "CONVOY-011",
            Self::MissingDependency { .. } => "CONVOY-012",
            Self::CycleDetected { .. } => "CONVOY-013",
            Self::ReadNotUpstream { .. } => "CONVOY-014",
            Self::ReadSkippable { .. } => "CONVOY-015",
            Self::UnknownJob { .. } => "CONVOY-016",
            Self::JobNotFinished { .. } => "CONVOY-020",
            Self::InsufficientOutput { .. } => "CONVOY-021",
            Self::UnknownAttribute { .. } => "CONVOY-022",
            Self::IllegalTransition { .. } => "CONVOY-023",
            Self::UndeclaredRead { .. } => "CONVOY-024",
            Self::NotRunning { .. } => "CONVOY-030",
            Self::PromptDropped { .. } => "CONVOY-031",
            Self::InvalidAnswer { .. } => "CONVOY-032",
            Self::RequestedNotFound { .. } => "CONVOY-040",
            Self::RequestFailed { .. } => "CONVOY-041",
            Self::InspectionFailed { .. } => "CONVOY-042",
            Self::Validation { .. } => "CONVOY-043",
            Self::WorkerFailed { .. } => "CONVOY-044",
            Self::UnexpectedLine { .. } => "CONVOY-050",
            Self::MissingOption { .. } => "CONVOY-051",
            Self::Cancelled => "CONVOY-060",
            Self::TaskPanicked { .. } => "CONVOY-061",
            Self::Io(_) => "CONVOY-090",
            Self::Json(_) => "CONVOY-091",
            Self::YamlParse(_) => "CONVOY-092",
        }
    }

    /// Classify this error for `catch` / `nonfatal` matching
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigError { .. } | Self::PlanParse { .. } | Self::YamlParse(_) => {
                ErrorKind::Config
            }
            Self::InvalidJobName { .. }
            | Self::DuplicateJob { .. }
            | Self::MissingDependency { .. }
            | Self::CycleDetected { .. }
            | Self::ReadNotUpstream { .. }
            | Self::ReadSkippable { .. }
            | Self::UnknownJob { .. } => ErrorKind::Graph,
            Self::JobNotFinished { .. }
            | Self::InsufficientOutput { .. }
            | Self::UnknownAttribute { .. }
            | Self::IllegalTransition { .. }
            | Self::UndeclaredRead { .. }
            | Self::TaskPanicked { .. } => ErrorKind::State,
            Self::NotRunning { .. } | Self::PromptDropped { .. } | Self::InvalidAnswer { .. } => {
                ErrorKind::Prompt
            }
            Self::RequestedNotFound { .. } => ErrorKind::NotFound,
            Self::RequestFailed { .. } => ErrorKind::Request,
            Self::InspectionFailed { .. } => ErrorKind::Inspection,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::WorkerFailed { .. } => ErrorKind::Worker,
            Self::UnexpectedLine { .. } | Self::MissingOption { .. } => ErrorKind::Payload,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
        }
    }

    /// Programming and configuration errors abort the whole run.
    ///
    /// Everything else stays local to the job that raised it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Config
                | ErrorKind::Graph
                | ErrorKind::State
                | ErrorKind::Prompt
                | ErrorKind::Payload
                | ErrorKind::Cancelled
        )
    }

    /// Check if this error is recoverable (retry might help)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::InspectionFailed { .. } | Self::Io(_)
        )
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn request_failed(reason: impl Into<String>) -> Self {
        Self::RequestFailed {
            reason: reason.into(),
        }
    }

    pub fn not_found(query: impl Into<String>) -> Self {
        Self::RequestedNotFound {
            query: query.into(),
        }
    }
}

impl FixSuggestion for ConvoyError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ConvoyError::ConfigError { .. } => Some("Check ~/.config/convoy/config.toml"),
            ConvoyError::PlanParse { .. } => Some("Check YAML syntax: indentation and quoting"),
            ConvoyError::InvalidJobName { .. } => {
                Some("Use lowercase letters, digits, '-' and '_' in job names")
            }
            ConvoyError::DuplicateJob { .. } => Some("Give every job a unique name"),
            ConvoyError::MissingDependency { .. } => {
                Some("Declare the job or remove it from prejobs/reads")
            }
            ConvoyError::CycleDetected { .. } => {
                Some("Remove one of the prejob edges on the cycle")
            }
            ConvoyError::ReadNotUpstream { .. } => Some("Add the read target to prejobs"),
            ConvoyError::ReadSkippable { .. } => {
                Some("Use a prejob for ordering only, or read with a default in the worker")
            }
            ConvoyError::UnknownJob { .. } => Some("Check the job name (see `convoy graph`)"),
            ConvoyError::JobNotFinished { .. } => {
                Some("Only read outputs of prejobs, or use a *_or variant with a default")
            }
            ConvoyError::InsufficientOutput { .. } => {
                Some("Use get_job_output_or with a default")
            }
            ConvoyError::UnknownAttribute { .. } => {
                Some("Check which attributes the job sets")
            }
            ConvoyError::IllegalTransition { .. } => None,
            ConvoyError::UndeclaredRead { .. } => Some("Add the job to prejobs or reads"),
            ConvoyError::NotRunning { .. } => {
                Some("Only send output or prompt from inside a running worker")
            }
            ConvoyError::PromptDropped { .. } => Some("Check the presenter answers every prompt"),
            ConvoyError::InvalidAnswer { .. } => Some("Answer with one of the offered options"),
            ConvoyError::RequestedNotFound { .. } => Some("Check the spelling of the query"),
            ConvoyError::RequestFailed { .. } => Some("Check network connectivity and retry"),
            ConvoyError::InspectionFailed { .. } => Some("Check the content path is readable"),
            ConvoyError::Validation { .. } => None,
            ConvoyError::WorkerFailed { .. } => None,
            ConvoyError::UnexpectedLine { .. } => {
                Some("Contributor lines look like 'Role: Name | URL'")
            }
            ConvoyError::MissingOption { .. } => Some("Set the value in config.toml"),
            ConvoyError::Cancelled => None,
            ConvoyError::TaskPanicked { .. } => Some("This is a bug, please report it"),
            ConvoyError::Io(_) => Some("Check file path and permissions"),
            ConvoyError::Json(_) => Some("Check the JSON file is not corrupted"),
            ConvoyError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}
