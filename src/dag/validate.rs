//! Construction-time validation
//!
//! Job names must be non-empty and contain only `[a-z0-9_-]`. Names end up in
//! cache file names and event logs, so anything else is rejected early.
//!
//! `reads` declarations (and the jobs a precondition check inspects) must
//! point upstream. A `reads` target must also be unconditional and catch no
//! errors: reading the output of a job that may be SKIPPED or finish degraded
//! with its output cleared is a configuration error, while merely ordering
//! after it through `prejobs` is fine.

use rustc_hash::FxHashMap;

use crate::dag::JobGraph;
use crate::error::{ConvoyError, Result};
use crate::job::JobSpec;

/// Validate a job name without regex overhead
pub fn validate_job_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConvoyError::InvalidJobName {
            name: name.to_string(),
            reason: "cannot be empty".into(),
        });
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
    {
        return Err(ConvoyError::InvalidJobName {
            name: name.to_string(),
            reason: format!("unexpected character {:?}; use [a-z0-9_-]", bad),
        });
    }

    Ok(())
}

/// Check every `reads` entry and every job referenced by a precondition
pub fn validate_reads(specs: &[JobSpec], graph: &JobGraph) -> Result<()> {
    let by_name: FxHashMap<&str, &JobSpec> = specs.iter().map(|s| (s.name().as_ref(), s)).collect();

    for spec in specs {
        let job = spec.name().as_ref();

        for read in spec.read_names() {
            let Some(target) = by_name.get(read.as_ref()) else {
                return Err(ConvoyError::MissingDependency {
                    job: job.to_string(),
                    dep: read.to_string(),
                });
            };
            ensure_upstream(graph, job, read)?;
            if target.condition().is_some() || target.may_degrade() {
                return Err(ConvoyError::ReadSkippable {
                    job: job.to_string(),
                    read: read.to_string(),
                });
            }
        }

        if let Some(check) = spec.condition() {
            for referenced in check.referenced_jobs() {
                if !by_name.contains_key(referenced) {
                    return Err(ConvoyError::MissingDependency {
                        job: job.to_string(),
                        dep: referenced.to_string(),
                    });
                }
                ensure_upstream(graph, job, referenced)?;
            }
        }
    }

    Ok(())
}

fn ensure_upstream(graph: &JobGraph, job: &str, read: &str) -> Result<()> {
    if read != job && graph.has_path(read, job) {
        Ok(())
    } else {
        Err(ConvoyError::ReadNotUpstream {
            job: job.to_string(),
            read: read.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::job::Check;

    fn graph(specs: &[JobSpec]) -> JobGraph {
        JobGraph::build(specs.iter().map(|s| (s.name(), s.prejob_names()))).unwrap()
    }

    #[test]
    fn test_valid_names() {
        for name in ["imdb", "title-year", "audio_lang", "x264", "2pass"] {
            assert!(validate_job_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Title", "has space", "dot.ted", "emoji🎬"] {
            let err = validate_job_name(name).unwrap_err();
            assert!(matches!(err, ConvoyError::InvalidJobName { .. }), "{name}");
        }
    }

    #[test]
    fn test_read_of_transitive_prejob_is_ok() {
        let specs = vec![
            JobSpec::constant("a", ["1"]),
            JobSpec::constant("b", ["2"]).prejobs(["a"]),
            JobSpec::constant("c", ["3"]).prejobs(["b"]).reads(["a"]),
        ];
        assert!(validate_reads(&specs, &graph(&specs)).is_ok());
    }

    #[test]
    fn test_read_not_upstream() {
        let specs = vec![
            JobSpec::constant("a", ["1"]),
            JobSpec::constant("b", ["2"]).reads(["a"]),
        ];
        let err = validate_reads(&specs, &graph(&specs)).unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::ReadNotUpstream { job, read } if job == "b" && read == "a"
        ));
    }

    #[test]
    fn test_read_of_gated_job_is_rejected() {
        let specs = vec![
            JobSpec::constant("a", ["1"]).when(Check::option("with_a")),
            JobSpec::constant("b", ["2"]).prejobs(["a"]),
            JobSpec::constant("c", ["3"]).prejobs(["b"]).reads(["a"]),
        ];
        let err = validate_reads(&specs, &graph(&specs)).unwrap_err();
        assert!(matches!(err, ConvoyError::ReadSkippable { .. }));
        assert_eq!(err.code(), "CONVOY-015");
    }

    #[test]
    fn test_read_of_degradable_job_is_rejected() {
        let specs = vec![
            JobSpec::constant("a", ["1"]).catch([ErrorKind::Request]),
            JobSpec::constant("c", ["3"]).prejobs(["a"]).reads(["a"]),
        ];
        let err = validate_reads(&specs, &graph(&specs)).unwrap_err();
        assert!(matches!(
            err,
            ConvoyError::ReadSkippable { job, read } if job == "c" && read == "a"
        ));
    }

    #[test]
    fn test_ordering_after_gated_job_is_ok() {
        let specs = vec![
            JobSpec::constant("a", ["1"]).when(Check::option("with_a")),
            JobSpec::constant("b", ["2"]).prejobs(["a"]),
        ];
        assert!(validate_reads(&specs, &graph(&specs)).is_ok());
    }

    #[test]
    fn test_unknown_read() {
        let specs = vec![JobSpec::constant("b", ["2"]).reads(["ghost"])];
        let err = validate_reads(&specs, &graph(&specs)).unwrap_err();
        assert!(matches!(err, ConvoyError::MissingDependency { .. }));
    }

    #[test]
    fn test_check_must_reference_upstream() {
        let specs = vec![
            JobSpec::constant("a", ["1"]),
            JobSpec::constant("b", ["2"]).when(Check::finished("a")),
        ];
        assert!(matches!(
            validate_reads(&specs, &graph(&specs)).unwrap_err(),
            ConvoyError::ReadNotUpstream { .. }
        ));

        let specs = vec![
            JobSpec::constant("a", ["1"]).when(Check::option("x")),
            JobSpec::constant("b", ["2"]).prejobs(["a"]).when(Check::finished("a")),
        ];
        assert!(validate_reads(&specs, &graph(&specs)).is_ok());
    }
}
