//! Snapshot builder.
//!
//! Folds per-source validation outcomes into the next snapshot. Pure:
//! the caller supplies the previous snapshot and the clock, and gets
//! back the new snapshot, its change set and one status per source.

use chrono::{DateTime, Utc};

use crate::models::{
    ChangeSet, Snapshot, SnapshotFile, SourceReport, SourceSpec, SourceStatus, ValidationOutcome,
};
use crate::pipeline::circuit_breaker::CircuitBreaker;
use crate::pipeline::diff::calculate_diff;

/// Validated result for one source, with the cache validators its
/// fetch returned.
#[derive(Debug, Clone)]
pub struct SourceOutcome<'a> {
    pub source: &'a SourceSpec,
    pub outcome: ValidationOutcome,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl<'a> SourceOutcome<'a> {
    pub fn new(source: &'a SourceSpec, outcome: ValidationOutcome) -> Self {
        Self {
            source,
            outcome,
            etag: None,
            last_modified: None,
        }
    }
}

/// Output of [`SnapshotBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub snapshot: Snapshot,
    pub changes: ChangeSet,
    /// One entry per source, in input order
    pub reports: Vec<SourceReport>,
}

/// Builder assembling the next snapshot from validation outcomes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    circuit_breaker: CircuitBreaker,
}

impl SnapshotBuilder {
    pub fn new(circuit_breaker: CircuitBreaker) -> Self {
        Self { circuit_breaker }
    }

    /// Build the next snapshot.
    ///
    /// Accepted content replaces the previous file (unless the drop guard
    /// trips); a rejected source keeps its previous file as stale, or is
    /// missing when there is none. Previous files of sources not in
    /// `outcomes` are left out and show up as removed.
    pub fn build(
        &self,
        outcomes: Vec<SourceOutcome<'_>>,
        previous: &Snapshot,
        now: DateTime<Utc>,
    ) -> BuildResult {
        let mut snapshot = Snapshot::new();
        let mut reports = Vec::with_capacity(outcomes.len());

        for SourceOutcome {
            source,
            outcome,
            etag,
            last_modified,
        } in outcomes
        {
            let old = previous.get(&source.filename);

            let outcome = match outcome {
                ValidationOutcome::Accepted { rule_count, .. } => match self.circuit_breaker.guard(
                    &source.name,
                    rule_count,
                    old.map(|f| f.rule_count),
                ) {
                    Ok(()) => outcome,
                    Err(reason) => ValidationOutcome::Rejected(reason),
                },
                rejected => rejected,
            };

            let status = match (outcome, old) {
                (ValidationOutcome::Accepted { content, rule_count }, Some(old))
                    if old.content == content =>
                {
                    snapshot.insert(
                        source.filename.clone(),
                        SnapshotFile {
                            rule_count,
                            etag: etag.or_else(|| old.etag.clone()),
                            last_modified: last_modified.or_else(|| old.last_modified.clone()),
                            ..old.clone()
                        },
                    );
                    SourceStatus::Unchanged { rule_count }
                }
                (ValidationOutcome::Accepted { content, rule_count }, _) => {
                    snapshot.insert(
                        source.filename.clone(),
                        SnapshotFile {
                            updated_at: now,
                            etag,
                            last_modified,
                            ..SnapshotFile::new(source, content, rule_count)
                        },
                    );
                    SourceStatus::Updated { rule_count }
                }
                (ValidationOutcome::Rejected(reason), Some(old)) => {
                    log::warn!("{} rejected ({}), keeping previous content", source.name, reason);
                    snapshot.insert(source.filename.clone(), old.clone());
                    SourceStatus::Stale { reason }
                }
                (ValidationOutcome::Rejected(reason), None) => {
                    log::warn!("{} rejected ({}), no previous content", source.name, reason);
                    SourceStatus::Missing { reason }
                }
            };

            reports.push(SourceReport::new(&source.name, &source.filename, status));
        }

        let changes = calculate_diff(previous, &snapshot);
        BuildResult {
            snapshot,
            changes,
            reports,
        }
    }
}
