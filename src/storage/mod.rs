//! Storage abstractions for published list snapshots.
//!
//! The output directory is both the previous run's state and this run's
//! destination:
//!
//! ```text
//! {output}/
//! ├── easylist.txt          # One normalized list per registered source
//! ├── easyprivacy.txt
//! ├── metadata.json         # Manifest: digests, rule counts, cache validators
//! └── rules.db              # Full-text search index (rebuilt every run)
//! ```

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChangeSet, Manifest, Snapshot};
use crate::services::SourceRegistry;

pub use local::LocalStorage;

/// Manifest filename inside the output directory.
pub const MANIFEST_FILE: &str = "metadata.json";

/// Metadata about a snapshot write.
#[derive(Debug, Clone, Default)]
pub struct WriteMetadata {
    /// Files written this run
    pub written: Vec<String>,
    /// Orphaned files deleted this run
    pub removed: Vec<String>,
    /// Files that could not be written, with the error
    pub failures: Vec<(String, String)>,
}

impl WriteMetadata {
    pub fn failure(&self, filename: &str) -> Option<&str> {
        self.failures
            .iter()
            .find(|(f, _)| f == filename)
            .map(|(_, message)| message.as_str())
    }
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Make sure the destination exists and is writable.
    async fn prepare(&self) -> Result<()>;

    /// Load the previously published snapshot for the registered sources,
    /// plus manifest-owned files whose source is no longer registered.
    async fn load_snapshot(&self, registry: &SourceRegistry) -> Result<Snapshot>;

    /// Write changed files atomically and delete removed ones.
    ///
    /// Per-file failures are collected in the returned metadata; only a
    /// failure affecting the whole destination is an error.
    async fn write_files(&self, snapshot: &Snapshot, changes: &ChangeSet) -> Result<WriteMetadata>;

    /// Write the manifest describing `snapshot`.
    async fn write_manifest(&self, snapshot: &Snapshot) -> Result<()>;

    async fn load_manifest(&self) -> Result<Manifest>;

    /// Path where the search index should be written.
    fn index_path(&self, filename: &str) -> PathBuf;
}
