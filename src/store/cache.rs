//! JobCache - replayable job results
//!
//! Keyed by job name plus an optional cache id (e.g. the release name), so
//! the same plan applied to different content never shares entries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::job::Job;

/// Stored result of one job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub output: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl CacheEntry {
    /// Snapshot of a job's output and attributes
    pub fn from_job(job: &Job) -> Self {
        Self {
            output: job.output(),
            attributes: job.attributes().into_iter().collect(),
        }
    }
}

/// Cache key: job name plus optional cache id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub job: Arc<str>,
    pub id: Option<String>,
}

impl CacheKey {
    pub fn new(job: impl Into<Arc<str>>, id: Option<impl Into<String>>) -> Self {
        Self {
            job: job.into(),
            id: id.map(Into::into),
        }
    }

    pub fn for_job(job: &Job) -> Self {
        Self::new(Arc::clone(job.name_arc()), job.spec().cache_id_text())
    }

    /// File name safe on every platform: `<job>[.<id>].json`
    pub fn file_name(&self) -> String {
        match &self.id {
            Some(id) => format!("{}.{}.json", self.job, sanitize(id)),
            None => format!("{}.json", self.job),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.job, id),
            None => f.write_str(&self.job),
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Storage for replayable job results
#[async_trait]
pub trait JobCache: Send + Sync {
    /// `Ok(None)` on a miss
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════

/// In-process cache (lock-free via DashMap, cheap to clone)
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Seed an entry directly
    pub fn insert(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }
}

#[async_trait]
impl JobCache for MemoryCache {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        self.entries.insert(key.clone(), entry.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// FILE
// ═══════════════════════════════════════════════════════════════

/// One pretty-printed JSON file per key
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl JobCache for FileCache {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let path = self.path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), "cache hit");
        Ok(Some(serde_json::from_str(&content)?))
    }

    async fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(key);
        tokio::fs::write(&path, serde_json::to_string_pretty(entry)?).await?;
        debug!(path = %path.display(), "cache stored");
        Ok(())
    }
}
