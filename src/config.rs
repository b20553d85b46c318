//! Convoy Configuration Module
//!
//! Run options shared read-only by every job, worker and precondition.
//! Config is stored in `~/.config/convoy/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (applied by the binary through the `with_*` builders)
//! 2. Environment variables (`CONVOY_IGNORE_CACHE`, `CONVOY_CACHE_DIR`)
//! 3. Config file (`~/.config/convoy/config.toml`)
//! 4. Defaults
//!
//! Options are wrapped in an `Arc` when the pipeline is built and never
//! mutated afterwards.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConvoyError, Result};

pub const ENV_IGNORE_CACHE: &str = "CONVOY_IGNORE_CACHE";
pub const ENV_CACHE_DIR: &str = "CONVOY_CACHE_DIR";

/// Immutable run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Options {
    /// Target job for partial re-runs; only its dependency closure is built
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolate: Option<String>,

    /// Bypass the job cache for every job
    #[serde(default)]
    pub ignore_cache: bool,

    /// Directory holding cached job results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Free-form values read by preconditions and workers
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Options {
    /// Get the config directory path
    ///
    /// Returns `~/.config/convoy/` on Unix, `%APPDATA%/convoy/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("convoy")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load options from the default config file
    ///
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load options from an explicit path
    ///
    /// Returns defaults if the file doesn't exist, an error if it is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConvoyError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| ConvoyError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_IGNORE_CACHE) {
            if !raw.is_empty() {
                self.ignore_cache = is_truthy_str(&raw);
            }
        }

        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            if !dir.is_empty() {
                self.cache_dir = Some(PathBuf::from(dir));
            }
        }

        self
    }

    pub fn with_isolate(mut self, job: impl Into<String>) -> Self {
        self.isolate = Some(job.into());
        self
    }

    pub fn with_ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value, `None` if missing or not a string
    pub fn str_value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Truthiness of a value: missing, null, false, 0, "" and "0"/"false"/"no" are false
    pub fn flag(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(is_truthy)
    }

    /// Cache directory, falling back to `~/.cache/convoy`
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("convoy")
        })
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => is_truthy_str(s),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn is_truthy_str(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
