//! Snapshot of published list files.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{SourceSpec, SyntaxKind};

/// One published list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    /// Source name that owns the file
    pub source: String,
    /// Source URL
    pub url: String,
    /// Syntax used to classify lines for indexing
    pub syntax: SyntaxKind,
    /// Normalized, newline-terminated content
    pub content: String,
    pub rule_count: usize,
    /// When the content last changed
    pub updated_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl SnapshotFile {
    /// New file for `source`, stamped with the current time.
    pub fn new(source: &SourceSpec, content: String, rule_count: usize) -> Self {
        Self {
            source: source.name.clone(),
            url: source.url.clone(),
            syntax: source.syntax,
            content,
            rule_count,
            updated_at: Utc::now(),
            etag: None,
            last_modified: None,
        }
    }

    /// Hex SHA-256 of the content.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.content.as_bytes()))
    }
}

/// Set of list files keyed by output filename.
///
/// `BTreeMap` keeps iteration (and therefore the index and manifest)
/// in a stable order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub files: BTreeMap<String, SnapshotFile>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<&SnapshotFile> {
        self.files.get(filename)
    }

    pub fn insert(&mut self, filename: impl Into<String>, file: SnapshotFile) {
        self.files.insert(filename.into(), file);
    }

    pub fn remove(&mut self, filename: &str) -> Option<SnapshotFile> {
        self.files.remove(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.files.contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_rules(&self) -> usize {
        self.files.values().map(|f| f.rule_count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotFile)> {
        self.files.iter()
    }
}

/// `metadata.json` entry for a written file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub url: String,
    pub rule_count: usize,
    pub sha256: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl From<&SnapshotFile> for ManifestEntry {
    fn from(file: &SnapshotFile) -> Self {
        Self {
            name: file.source.clone(),
            url: file.url.clone(),
            rule_count: file.rule_count,
            sha256: file.digest(),
            updated_at: file.updated_at,
            etag: file.etag.clone(),
            last_modified: file.last_modified.clone(),
        }
    }
}

/// Contents of `metadata.json`, keyed by filename.
pub type Manifest = BTreeMap<String, ManifestEntry>;
