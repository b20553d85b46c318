//! DAG Module - job dependency graph
//!
//! Contains the graph representation and construction-time validation:
//! - `graph`: JobGraph built from job specs (prejob edges)
//! - `validate`: job names and `reads` declarations
//!
//! JobGraph is immutable after construction.

mod graph;
mod validate;

pub use graph::{DepVec, JobGraph};
pub use validate::{validate_job_name, validate_reads};
