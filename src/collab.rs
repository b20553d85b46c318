//! Collaborators - external services consumed through narrow traits
//!
//! - [`MetadataClient`]: remote metadata lookups and entity creation
//! - [`ContentInspector`]: facts read from the release content itself
//!
//! The engine ships no network or media code; plans and tests provide the
//! implementations. This module also holds the entity lookup loop shared by
//! every worker that asks the user for a name.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConvoyError, Result};
use crate::job::{JobContext, Worker};

/// An entity known to the destination (artist, studio, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub url: String,
}

impl Entity {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Remote metadata service
///
/// Lookups fail with `RequestedNotFound` when nothing matches and with
/// `RequestFailed` for transport or server problems.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch_metadata(&self, id: &str) -> Result<Map<String, Value>>;

    async fn find_entity(&self, name: &str) -> Result<Entity>;

    async fn create_entity(&self, name: &str) -> Result<Entity>;
}

/// Facts about the release content
///
/// Failures are reported as `InspectionFailed`; they only cost the default
/// a field would have been pre-filled with.
#[async_trait]
pub trait ContentInspector: Send + Sync {
    async fn duration(&self) -> Result<Duration>;

    async fn languages(&self) -> Result<Vec<String>>;

    async fn bit_depth(&self) -> Result<u8>;
}

// ═══════════════════════════════════════════════════════════════
// ENTITY LOOKUP
// ═══════════════════════════════════════════════════════════════

const ENTITY_INFO: &str = "Enter a name, or nothing to stop.";

enum Lookup {
    Found(Entity),
    GaveUp,
    /// Ask again, pre-filled with the new default (or the previous one)
    Retry(Option<String>),
}

async fn ask_name(ctx: &JobContext, question: &str, default: &str) -> Result<String> {
    ctx.set_info(ENTITY_INFO);
    let answer = ctx.ask_text(question, default).await;
    ctx.set_info("");
    Ok(answer?.trim().to_string())
}

/// Ask for a name and look it up until it is found or the user gives up.
///
/// An empty answer returns `None`. Unknown names are reported as a warning
/// and asked again, pre-filled with the rejected name. Failed requests are
/// reported the same way but keep the previous default.
pub async fn prompt_entity(
    ctx: &JobContext,
    client: &dyn MetadataClient,
    question: &str,
    initial: &str,
) -> Result<Option<Entity>> {
    lookup_loop(ctx, client, question, initial, false).await
}

/// Like [`prompt_entity`], but offers to create names that are not found.
///
/// Creation needs two confirmations, both focused on "No". Declining either
/// goes back to the name prompt.
pub async fn resolve_entity(
    ctx: &JobContext,
    client: &dyn MetadataClient,
    question: &str,
    initial: &str,
) -> Result<Option<Entity>> {
    lookup_loop(ctx, client, question, initial, true).await
}

async fn lookup_loop(
    ctx: &JobContext,
    client: &dyn MetadataClient,
    question: &str,
    initial: &str,
    offer_create: bool,
) -> Result<Option<Entity>> {
    let mut default = initial.to_string();
    loop {
        let name = ask_name(ctx, question, &default).await?;
        match lookup_once(ctx, client, &name, offer_create).await? {
            Lookup::GaveUp => return Ok(None),
            Lookup::Found(entity) => {
                ctx.clear_warnings();
                return Ok(Some(entity));
            }
            Lookup::Retry(Some(next)) => default = next,
            Lookup::Retry(None) => {}
        }
    }
}

async fn lookup_once(
    ctx: &JobContext,
    client: &dyn MetadataClient,
    name: &str,
    offer_create: bool,
) -> Result<Lookup> {
    if name.is_empty() {
        return Ok(Lookup::GaveUp);
    }

    let found = match client.find_entity(name).await {
        Err(ConvoyError::RequestedNotFound { .. }) if offer_create => {
            create_confirmed(ctx, client, name).await
        }
        other => other,
    };

    match found {
        Ok(entity) => Ok(Lookup::Found(entity)),
        Err(e @ ConvoyError::RequestedNotFound { .. }) => {
            debug!(job = %ctx.name(), %name, "entity not found");
            ctx.warn(e.to_string());
            Ok(Lookup::Retry(Some(name.to_string())))
        }
        Err(e @ ConvoyError::RequestFailed { .. }) => {
            ctx.warn(e.to_string());
            Ok(Lookup::Retry(None))
        }
        Err(e) => Err(e),
    }
}

async fn create_confirmed(
    ctx: &JobContext,
    client: &dyn MetadataClient,
    name: &str,
) -> Result<Entity> {
    let not_found = || ConvoyError::not_found(name);

    let create = format!("Create new entity with the name \"{}\"?", name);
    if !ctx.confirm(&create, false).await? {
        return Err(not_found());
    }

    let sure = format!("Are you sure \"{}\" does not exist yet?", name);
    if !ctx.confirm(&sure, false).await? {
        return Err(not_found());
    }

    client.create_entity(name).await
}

// ═══════════════════════════════════════════════════════════════
// WORKERS
// ═══════════════════════════════════════════════════════════════

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Fetches metadata for the id emitted by another job.
///
/// Every selected field present in the response becomes an attribute of the
/// same name; their text forms are emitted in selection order.
pub struct MetadataWorker {
    client: Arc<dyn MetadataClient>,
    id_job: Arc<str>,
    fields: Vec<String>,
}

impl MetadataWorker {
    pub fn new(
        client: Arc<dyn MetadataClient>,
        id_job: impl Into<Arc<str>>,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            client,
            id_job: id_job.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Worker for MetadataWorker {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        let id = ctx.output(&self.id_job, 0)?;
        let metadata = self.client.fetch_metadata(&id).await?;

        for field in &self.fields {
            let Some(value) = metadata.get(field) else {
                debug!(job = %ctx.name(), %field, "field missing from metadata");
                continue;
            };
            ctx.set_attribute(field.clone(), value.clone());
            if let Some(text) = value_text(value) {
                ctx.send(text)?;
            }
        }
        Ok(())
    }
}

/// What an [`InspectorWorker`] reads from the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    Duration,
    Languages,
    BitDepth,
}

/// Emits one content fact: the duration in whole minutes, one output per
/// language, or the bit depth
pub struct InspectorWorker {
    inspector: Arc<dyn ContentInspector>,
    probe: Probe,
}

impl InspectorWorker {
    pub fn new(inspector: Arc<dyn ContentInspector>, probe: Probe) -> Self {
        Self { inspector, probe }
    }
}

#[async_trait]
impl Worker for InspectorWorker {
    async fn run(&self, ctx: JobContext) -> Result<()> {
        match self.probe {
            Probe::Duration => {
                let duration = self.inspector.duration().await?;
                ctx.set_attribute("seconds", duration.as_secs());
                ctx.send((duration.as_secs() / 60).to_string())
            }
            Probe::Languages => {
                for language in self.inspector.languages().await? {
                    ctx.send(language)?;
                }
                Ok(())
            }
            Probe::BitDepth => {
                let depth = self.inspector.bit_depth().await?;
                ctx.send(depth.to_string())
            }
        }
    }
}
