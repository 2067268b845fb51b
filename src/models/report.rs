//! Run report types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RejectReason;

/// Filenames whose published content differs from the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// All changed filenames, sorted.
    pub fn filenames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .any(|f| f == filename)
    }
}

/// Final state of one source after a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// New content accepted and published
    Updated { rule_count: usize },
    /// Accepted, identical to what was already published
    Unchanged { rule_count: usize },
    /// Rejected this run; previous content kept
    Stale { reason: RejectReason },
    /// Rejected this run and nothing to fall back to
    Missing { reason: RejectReason },
    /// Accepted but the file could not be written
    WriteFailed { message: String, stale: bool },
}

impl SourceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Updated { .. } => "updated",
            SourceStatus::Unchanged { .. } => "unchanged",
            SourceStatus::Stale { .. } => "stale",
            SourceStatus::Missing { .. } => "missing",
            SourceStatus::WriteFailed { .. } => "write-failed",
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            SourceStatus::Updated { .. } | SourceStatus::Unchanged { .. }
        )
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            SourceStatus::Stale { reason } | SourceStatus::Missing { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Outcome for one registered source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub name: String,
    pub filename: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

impl SourceReport {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, status: SourceStatus) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            status,
        }
    }
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub total: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub fetch_failed: usize,
    pub stale: usize,
    pub missing: usize,
    pub write_failed: usize,
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub changes: ChangeSet,
    /// Rule rows written to the search index, if one was built
    pub indexed_rules: Option<usize>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            sources: Vec::new(),
            changes: ChangeSet::default(),
            indexed_rules: None,
        }
    }

    pub fn counts(&self) -> RunCounts {
        let mut counts = RunCounts {
            total: self.sources.len(),
            ..RunCounts::default()
        };

        for source in &self.sources {
            match &source.status {
                SourceStatus::Updated { .. } | SourceStatus::Unchanged { .. } => {
                    counts.accepted += 1
                }
                SourceStatus::Stale { reason } | SourceStatus::Missing { reason } => {
                    if reason.is_fetch_failure() {
                        counts.fetch_failed += 1;
                    } else {
                        counts.rejected += 1;
                    }
                    if matches!(source.status, SourceStatus::Stale { .. }) {
                        counts.stale += 1;
                    } else {
                        counts.missing += 1;
                    }
                }
                SourceStatus::WriteFailed { stale, .. } => {
                    counts.write_failed += 1;
                    if *stale {
                        counts.stale += 1;
                    } else {
                        counts.missing += 1;
                    }
                }
            }
        }

        counts
    }

    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.name == name)
    }
}
