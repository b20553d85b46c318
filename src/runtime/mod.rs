//! Runtime Module - pipeline execution
//!
//! Contains the runtime execution components:
//! - `runner`: spawns every job on a JoinSet and handles abort
//! - `execute`: drives one job through its state machine
//! - `report`: serializable summary of a finished run
//!
//! This module represents the "how" - runtime execution.
//! For static structure, see the `pipeline` and `dag` modules.

mod execute;
mod report;
mod runner;

pub use report::{JobReport, RunReport};
pub use runner::Runner;
