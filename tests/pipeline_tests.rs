//! # Pipeline Construction Tests
//!
//! - Declaration order and isolated dependency closures
//! - Graph validation: cycles, unknown prejobs, duplicates
//! - Read validation: reads must be upstream and never skippable

use convoy::test_utils::CountingWorker;
use convoy::{Check, ConvoyError, JobSpec, JobState, Options, PipelineBuilder, Runner, ScriptedPresenter};
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn names<'a>(list: impl IntoIterator<Item = &'a Arc<str>>) -> Vec<&'a str> {
    list.into_iter().map(|n| n.as_ref()).collect()
}

/// release → imdb → {title, year}; tags stands alone
fn movie_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::constant("release", ["The.Matrix.1999.1080p"]),
        JobSpec::constant("imdb", ["tt0133093"]).prejobs(["release"]),
        JobSpec::constant("title", ["The Matrix"])
            .prejobs(["imdb"])
            .reads(["imdb"]),
        JobSpec::constant("year", ["1999"]).prejobs(["imdb", "release"]),
        JobSpec::constant("tags", ["action"]),
    ]
}

// ============================================================================
// ORDERING AND ISOLATION
// ============================================================================

#[test]
fn test_jobs_before_upload_follow_declaration() {
    let pipeline = PipelineBuilder::new(Options::default())
        .jobs(movie_jobs())
        .build()
        .unwrap();

    assert_eq!(
        names(pipeline.jobs_before_upload()),
        vec!["release", "imdb", "title", "year", "tags"]
    );
    let declared: Vec<&str> = pipeline.jobs().map(|j| j.name()).collect();
    assert_eq!(declared, vec!["release", "imdb", "title", "year", "tags"]);
}

#[test]
fn test_isolated_run_is_dependency_closure() {
    let pipeline = PipelineBuilder::new(Options::default().with_isolate("year"))
        .jobs(movie_jobs())
        .build()
        .unwrap();

    assert!(pipeline.is_isolated());
    assert_eq!(names(pipeline.isolated_jobs()), vec!["release", "imdb", "year"]);
    assert_eq!(names(pipeline.jobs_to_run()), vec!["release", "imdb", "year"]);
    assert!(pipeline.job("title").is_none());
    assert!(pipeline.job("tags").is_none());
}

#[tokio::test]
async fn test_isolated_run_never_submits() {
    let pipeline = PipelineBuilder::new(Options::default().with_isolate("imdb"))
        .jobs(movie_jobs())
        .build()
        .unwrap();
    let runner = Runner::new(pipeline);
    let report = runner
        .run(Arc::new(ScriptedPresenter::new(Vec::<String>::new())))
        .await
        .unwrap();

    assert_eq!(report.jobs.len(), 2);
    assert!(report.jobs.iter().all(|j| j.state == JobState::Finished));
    assert!(!report.submission_ok);
}

#[test]
fn test_get_job_and_dependencies_visits_extra_first() {
    let pipeline = PipelineBuilder::new(Options::default())
        .jobs(movie_jobs())
        .build()
        .unwrap();

    let jobs = pipeline.get_job_and_dependencies("title", &["tags"]).unwrap();
    let got: Vec<&str> = jobs.iter().map(|j| j.name()).collect();
    assert_eq!(got, vec!["tags", "release", "imdb", "title"]);

    let err = pipeline.get_job_and_dependencies("ghost", &[]).unwrap_err();
    assert_eq!(err.code(), "CONVOY-016");
}

// ============================================================================
// GRAPH VALIDATION
// ============================================================================

#[test]
fn test_cycle_is_reported_with_path() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]).prejobs(["b"]))
        .job(JobSpec::constant("b", ["2"]).prejobs(["a"]))
        .build()
        .unwrap_err();

    assert_eq!(err.code(), "CONVOY-013");
    assert_eq!(
        err.to_string(),
        "[CONVOY-013] Circular dependency detected: a → b → a"
    );
}

#[test]
fn test_unknown_prejob_is_rejected() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]).prejobs(["ghost"]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        ConvoyError::MissingDependency { job, dep } if job == "a" && dep == "ghost"
    ));
}

#[test]
fn test_duplicate_job_is_rejected() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]))
        .job(JobSpec::constant("a", ["2"]))
        .build()
        .unwrap_err();
    assert_eq!(err.code(), "CONVOY-011");
}

// ============================================================================
// READ VALIDATION
// ============================================================================

#[test]
fn test_read_must_be_upstream() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]))
        .job(JobSpec::constant("b", ["2"]).reads(["a"]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        ConvoyError::ReadNotUpstream { job, read } if job == "b" && read == "a"
    ));
}

#[test]
fn test_transitive_read_is_allowed() {
    let pipeline = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]))
        .job(JobSpec::constant("b", ["2"]).prejobs(["a"]))
        .job(JobSpec::constant("c", ["3"]).prejobs(["b"]).reads(["a"]))
        .build();
    assert!(pipeline.is_ok());
}

#[test]
fn test_reading_gated_job_fails_at_construction() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]).when(Check::option("with_a")))
        .job(JobSpec::constant("b", ["2"]).prejobs(["a"]).reads(["a"]))
        .build()
        .unwrap_err();
    assert_eq!(err.code(), "CONVOY-015");
}

#[tokio::test]
async fn test_skipped_prejob_does_not_stop_dependents() {
    let b = CountingWorker::new(["b"]);
    let c = CountingWorker::new(["c"]);
    let (b_calls, c_calls) = (b.counter(), c.counter());

    let pipeline = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]).when(Check::option("with_a")))
        .job(JobSpec::worker("b", b).prejobs(["a"]))
        .job(JobSpec::worker("c", c).prejobs(["b"]))
        .build()
        .unwrap();
    let runner = Runner::new(pipeline);
    let report = runner
        .run(Arc::new(ScriptedPresenter::new(Vec::<String>::new())))
        .await
        .unwrap();

    assert_eq!(report.job("a").unwrap().state, JobState::Skipped);
    assert_eq!(report.job("b").unwrap().state, JobState::Finished);
    assert_eq!(report.job("c").unwrap().state, JobState::Finished);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    assert!(report.submission_ok);
}

#[test]
fn test_precondition_reads_must_be_upstream() {
    let err = PipelineBuilder::new(Options::default())
        .job(JobSpec::constant("a", ["1"]))
        .job(JobSpec::constant("b", ["2"]).when(Check::output_present("a")))
        .build()
        .unwrap_err();
    assert_eq!(err.code(), "CONVOY-014");
}
