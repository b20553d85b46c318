//! # Collaborator Tests
//!
//! - Entity lookup loop: retries, giving up, two-step creation
//! - Contributors worker producing contributor lines
//! - Metadata and content inspector workers

use convoy::collab::{prompt_entity, resolve_entity, InspectorWorker, MetadataWorker, Probe};
use convoy::prompt::{self, PromptReceiver};
use convoy::test_utils::{
    finished_job, running_context, table, MockClient, MockInspector, MockResponse,
};
use convoy::{
    Contributor, ContributorRole, ContributorsWorker, Entity, JobSpec, Options, PipelineBuilder,
    Runner, ScriptedPresenter, Worker,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn answering(prompts: PromptReceiver, answers: &[&str]) -> (Arc<ScriptedPresenter>, JoinHandle<()>) {
    let presenter = Arc::new(ScriptedPresenter::new(answers.iter().copied()));
    let handle = tokio::spawn(prompt::serve(
        prompts,
        presenter.clone(),
        CancellationToken::new(),
    ));
    (presenter, handle)
}

fn lookup_job() -> JobSpec {
    JobSpec::constant("director", Vec::<String>::new())
}

// ============================================================================
// ENTITY LOOKUP
// ============================================================================

#[tokio::test]
async fn test_unknown_name_is_asked_again_with_rejected_text() {
    let client = MockClient::new().with_entity("Jeffrey Owl", "https://example.org/artist.php?id=7");
    let (ctx, prompts) = running_context(lookup_job(), table([]));
    let (presenter, _serve) = answering(prompts, &["jefrey owl", "Jeffrey Owl"]);

    let entity = prompt_entity(&ctx, &client, "Director name:", "")
        .await
        .unwrap();

    assert_eq!(
        entity,
        Some(Entity::new("Jeffrey Owl", "https://example.org/artist.php?id=7"))
    );
    let asked = presenter.asked();
    assert_eq!(asked.len(), 2);
    assert_eq!(asked[0].default.as_deref(), Some(""));
    assert_eq!(asked[1].default.as_deref(), Some("jefrey owl"));
    assert!(ctx.job().warnings().is_empty());
    assert_eq!(
        client.calls(),
        vec!["find_entity(jefrey owl)", "find_entity(Jeffrey Owl)"]
    );
}

#[tokio::test]
async fn test_failed_request_keeps_previous_default() {
    let client = MockClient::new().with_find_responses([MockResponse::Failed("timeout".into())]);
    let (ctx, prompts) = running_context(lookup_job(), table([]));
    let (presenter, _serve) = answering(prompts, &["Keanu Reeves", ""]);

    let entity = prompt_entity(&ctx, &client, "Actor name:", "Keanu")
        .await
        .unwrap();

    assert_eq!(entity, None);
    let asked = presenter.asked();
    assert_eq!(asked[0].default.as_deref(), Some("Keanu"));
    assert_eq!(asked[1].default.as_deref(), Some("Keanu"));
    assert_eq!(
        ctx.job().warnings(),
        vec!["[CONVOY-041] Request failed: timeout"]
    );
}

#[tokio::test]
async fn test_empty_name_gives_up_immediately() {
    let client = MockClient::new();
    let (ctx, prompts) = running_context(lookup_job(), table([]));
    let (presenter, _serve) = answering(prompts, &["", "Yes", "No"]);

    let entity = resolve_entity(&ctx, &client, "Director name:", "")
        .await
        .unwrap();

    assert_eq!(entity, None);
    assert!(client.calls().is_empty());
    assert_eq!(presenter.remaining(), 2);
}

#[tokio::test]
async fn test_unknown_name_created_after_two_confirmations() {
    let client = MockClient::new();
    let (ctx, prompts) = running_context(lookup_job(), table([]));
    let (presenter, _serve) = answering(prompts, &["jeffrey owl", "Yes", "Yes"]);

    let entity = resolve_entity(&ctx, &client, "Director name:", "")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entity.name, "jeffrey owl");
    assert_eq!(entity.url, "https://example.org/artist.php?id=new1");
    assert_eq!(
        client.calls(),
        vec!["find_entity(jeffrey owl)", "create_entity(jeffrey owl)"]
    );

    let asked = presenter.asked();
    assert_eq!(
        asked[1].question,
        "Create new entity with the name \"jeffrey owl\"?"
    );
    assert_eq!(
        asked[2].question,
        "Are you sure \"jeffrey owl\" does not exist yet?"
    );
    // Both confirmations default to "No"
    assert_eq!(asked[1].focused, Some(1));
    assert_eq!(asked[2].focused, Some(1));
}

#[tokio::test]
async fn test_declined_creation_asks_name_again() {
    let client = MockClient::new();
    let (ctx, prompts) = running_context(lookup_job(), table([]));
    let (presenter, _serve) = answering(prompts, &["jeffrey owl", "Yes", "No", ""]);

    let entity = resolve_entity(&ctx, &client, "Director name:", "")
        .await
        .unwrap();

    assert_eq!(entity, None);
    assert_eq!(client.calls(), vec!["find_entity(jeffrey owl)"]);
    let asked = presenter.asked();
    assert_eq!(asked.len(), 4);
    assert_eq!(asked[3].default.as_deref(), Some("jeffrey owl"));
}

// ============================================================================
// CONTRIBUTORS
// ============================================================================

#[tokio::test]
async fn test_contributors_worker_emits_lines() {
    let client = Arc::new(
        MockClient::new()
            .with_entity("Lana Wachowski", "https://example.org/artist.php?id=12")
            .with_entity("Keanu Reeves", "https://example.org/artist.php?id=34"),
    );
    let presenter = Arc::new(ScriptedPresenter::new([
        "Add director",
        "lana wachowski",
        "Add actor",
        "Keanu Reeves",
        "Neo",
        "Stop adding contributors",
    ]));
    let pipeline = PipelineBuilder::new(Options::default())
        .job(JobSpec::worker("contributors", ContributorsWorker::new(client)))
        .build()
        .unwrap();
    let runner = Runner::new(pipeline);

    let report = runner.run(presenter.clone()).await.unwrap();
    let lines = &report.job("contributors").unwrap().output;
    assert_eq!(
        lines,
        &vec![
            "Director: Lana Wachowski | https://example.org/artist.php?id=12".to_string(),
            "Actor: Keanu Reeves | Neo | https://example.org/artist.php?id=34".to_string(),
        ]
    );

    let actor = Contributor::parse(&lines[1]).unwrap();
    assert_eq!(actor.role, ContributorRole::Actor);
    assert_eq!(actor.character.as_deref(), Some("Neo"));
    assert_eq!(actor.external_id(), "34");
    assert_eq!(presenter.remaining(), 0);
}

// ============================================================================
// METADATA AND INSPECTION
// ============================================================================

#[tokio::test]
async fn test_metadata_worker_sets_attributes_and_outputs() {
    let client = Arc::new(
        MockClient::new().with_metadata("tt0133093", json!({"title": "The Matrix", "year": 1999})),
    );
    let spec = JobSpec::constant("metadata", Vec::<String>::new()).prejobs(["imdb"]);
    let (ctx, _prompts) = running_context(spec, table([finished_job("imdb", &["tt0133093"])]));

    let worker = MetadataWorker::new(client.clone(), "imdb", ["title", "year", "rating"]);
    worker.run(ctx.clone()).await.unwrap();

    let job = ctx.job();
    assert_eq!(job.output(), vec!["The Matrix", "1999"]);
    assert_eq!(job.attribute("year"), Some(json!(1999)));
    assert_eq!(job.attribute("rating"), None);
    assert_eq!(client.calls(), vec!["fetch_metadata(tt0133093)"]);
}

#[tokio::test]
async fn test_metadata_worker_unknown_id() {
    let client = Arc::new(MockClient::new());
    let spec = JobSpec::constant("metadata", Vec::<String>::new()).prejobs(["imdb"]);
    let (ctx, _prompts) = running_context(spec, table([finished_job("imdb", &["tt0"])]));

    let err = MetadataWorker::new(client, "imdb", ["title"])
        .run(ctx)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONVOY-040");
}

#[tokio::test]
async fn test_inspector_worker_probes() {
    let inspector = Arc::new(MockInspector {
        duration: Some(Duration::from_secs(8160)),
        languages: Some(vec!["English".into(), "German".into()]),
        bit_depth: None,
    });

    let (ctx, _prompts) = running_context(JobSpec::constant("runtime", Vec::<String>::new()), table([]));
    InspectorWorker::new(inspector.clone(), Probe::Duration)
        .run(ctx.clone())
        .await
        .unwrap();
    assert_eq!(ctx.job().output(), vec!["136"]);
    assert_eq!(ctx.job().attribute("seconds"), Some(json!(8160)));

    let (ctx, _prompts) = running_context(JobSpec::constant("languages", Vec::<String>::new()), table([]));
    InspectorWorker::new(inspector.clone(), Probe::Languages)
        .run(ctx.clone())
        .await
        .unwrap();
    assert_eq!(ctx.job().output(), vec!["English", "German"]);

    let (ctx, _prompts) = running_context(JobSpec::constant("bit_depth", Vec::<String>::new()), table([]));
    let err = InspectorWorker::new(inspector, Probe::BitDepth)
        .run(ctx)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONVOY-042");
}
