//! Convoy - job-dependency orchestration for interactive release submissions
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  job/       JobSpec, Job state machine, JobContext, fields   │
//! │  plan       YAML → job specs and payload rules               │
//! │  contrib    Contributor lines: prompt loop and parser        │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  pipeline   PipelineBuilder, job lists, submission_ok        │
//! │  runtime/   Runner (JoinSet, cancellation), RunReport        │
//! │  dag/       JobGraph, cycles, dependency closure, reads      │
//! │  prompt/    Prompt protocol, presenters                      │
//! │  payload/   Harvester, PayloadPlan assembly                  │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store/     Job result cache (DashMap, JSON files)           │
//! │  event/     Event sourcing (EventLog, EventKind)             │
//! │  collab     MetadataClient, ContentInspector traits          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`job`] | Job definition, lifecycle, worker context, preconditions |
//! | [`pipeline`] | Validated job registry and derived run lists |
//! | [`runtime`] | Concurrent execution in dependency order |
//! | [`dag`] | Dependency graph with FxHashMap optimization |
//! | [`prompt`] | Questions from jobs to a presenter, cancellable |
//! | [`payload`] | Output harvesting and payload assembly |
//! | [`store`] | Replayable job results |
//! | [`event`] | Event sourcing for audit trail |
//! | [`collab`] | External collaborator traits, entity lookup loop |
//! | [`contrib`] | Contributor line format |
//! | [`plan`] | Declarative plan files |
//! | [`error`] | Error types with fix suggestions |
//! | [`config`] | Immutable run options |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - jobs and plans
// ═══════════════════════════════════════════════════════════════
pub mod contrib;
pub mod job;
pub mod plan;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Execution logic
// ═══════════════════════════════════════════════════════════════
pub mod dag;
pub mod payload;
pub mod pipeline;
pub mod prompt;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Storage, events, collaborators
// ═══════════════════════════════════════════════════════════════
pub mod collab;
pub mod event;
pub mod store;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_utils;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{ConvoyError, ErrorKind, FixSuggestion, Result};

// Config types
pub use config::Options;

// Job types (Domain Model)
pub use job::{
    Check, ChoiceField, FnWorker, Job, JobBody, JobContext, JobSpec, JobState, TextField, Worker,
    CHOICE_ATTRIBUTE,
};

// Pipeline and runtime types (Application Layer)
pub use pipeline::{Pipeline, PipelineBuilder};
pub use runtime::{JobReport, RunReport, Runner};

// Prompt types
pub use prompt::{
    Answer, ChoiceOption, Presenter, Prompt, PromptRequest, ScriptedPresenter, TerminalPresenter,
};

// Payload types
pub use payload::{Branch, BranchFact, FieldSource, Harvester, Payload, PayloadPlan};

// Event types
pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter};

// Store types
pub use store::{CacheEntry, CacheKey, FileCache, JobCache, MemoryCache};

// Collaborators
pub use collab::{ContentInspector, Entity, MetadataClient};
pub use contrib::{Contributor, ContributorRole, ContributorsWorker};
pub use plan::Plan;
