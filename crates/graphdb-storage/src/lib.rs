//! GraphDB storage layer
//!
//! Turns a [`StorageConfig`] into a ready [`GraphStore`]:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        open(config)                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │   mode = memory ──────────────► GraphStore (no backend)       │
//! │                                                               │
//! │   mode = file(path)                                           │
//! │        │                                                      │
//! │        ▼                                                      │
//! │   ┌─────────────┐   load_all   ┌──────────────────────────┐   │
//! │   │ FileBackend │─────────────►│ GraphStore (replayed)    │   │
//! │   │ (.log file) │◄─────────────│ every mutation appended  │   │
//! │   └─────────────┘   records    └──────────────────────────┘   │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Append-only**: one record per effective mutation, never rewritten in place
//! - **Crash tolerant**: a torn trailing record is dropped on open
//! - **Batched commits**: `autocommit = false` defers fsync to [`GraphStore::commit`]
//! - **Compaction**: [`FileBackend::compact`] rewrites the log down to live state

pub mod persistence;


pub use persistence::{CompactionStats, FileBackend, LogRecord};

use anyhow::Context;
use graphdb_core::{GraphStore, StoreOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::path::{Path, PathBuf};

/// Path spec meaning "keep everything in memory".
pub const MEMORY_PATH: &str = ":memory:";

// ============================================================================
// Configuration
// ============================================================================

/// Where a store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Memory,
    File(PathBuf),
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StoreMode,
    /// Intern unseen values mentioned by relations
    pub autostore: bool,
    /// Flush to disk after every mutation
    pub autocommit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::Memory,
            autostore: true,
            autocommit: true,
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            mode: StoreMode::File(path.into()),
            ..Default::default()
        }
    }

    /// `""` and `":memory:"` select memory; anything else is a log path.
    pub fn from_path_spec(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec == MEMORY_PATH {
            Self::in_memory()
        } else {
            Self::file(spec)
        }
    }

    /// Read a JSON config; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            autostore: self.autostore,
            autocommit: self.autocommit,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.mode, StoreMode::File(_))
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Open a store as described by `config`, replaying any existing log.
pub fn open<V>(config: &StorageConfig) -> anyhow::Result<GraphStore<V>>
where
    V: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + 'static,
{
    match &config.mode {
        StoreMode::Memory => {
            tracing::info!("opening in-memory graph store");
            Ok(GraphStore::with_options(config.options()))
        }
        StoreMode::File(path) => {
            tracing::info!(path = %path.display(), "opening graph store");
            let backend = FileBackend::<V>::open(path)
                .with_context(|| format!("failed to open graph log {}", path.display()))?;
            GraphStore::with_backend(Box::new(backend), config.options())
                .with_context(|| format!("failed to replay graph log {}", path.display()))
        }
    }
}

/// Convenience: open from a path spec with default options.
pub fn open_path<V>(spec: &str) -> anyhow::Result<GraphStore<V>>
where
    V: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned + 'static,
{
    open(&StorageConfig::from_path_spec(spec))
}
