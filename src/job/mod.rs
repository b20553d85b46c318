//! Job Module - definition, runtime record and worker-facing context
//!
//! - `spec`: JobSpec builder, Worker trait, FnWorker adapter
//! - `state`: JobState machine
//! - `precondition`: Check combinators and make_precondition
//! - `handle`: Job runtime record, JobTable
//! - `context`: JobContext handed to workers
//! - `field`: interactive text and choice fields

mod context;
mod field;
mod handle;
pub mod precondition;
mod spec;
mod state;

pub use context::JobContext;
pub use field::{ChoiceField, Prefill, TextField, CHOICE_ATTRIBUTE};
pub use handle::{Job, JobTable};
pub use precondition::{make_precondition, Check, Precondition, RunSet};
pub use spec::{FnWorker, JobBody, JobSpec, Normalizer, Validator, Worker};
pub use state::JobState;

pub(crate) use field::{run_choice, run_text};
