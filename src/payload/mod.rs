//! Payload Module - reading finished jobs and shaping the submission
//!
//! - `harvest`: Harvester with strict and defaulting output/attribute reads
//! - `assemble`: PayloadPlan, FieldSource, branch on one job-derived fact

mod assemble;
mod harvest;

pub use assemble::{Branch, BranchFact, BranchTaken, FieldRule, FieldSource, Fragment, Payload, PayloadPlan};
pub use harvest::Harvester;
