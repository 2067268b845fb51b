// src/pipeline/run.rs

//! Update pipeline entry point.
//!
//! Registry → fetch → validate → snapshot → index → report. Per-source
//! failures become report entries; only an unusable output directory or
//! a failed index build abort the run.

use chrono::Utc;

use crate::error::Result;
use crate::models::{
    Config, FetchResult, FetchedBody, RunReport, Snapshot, SourceSpec, SourceStatus,
    ValidationOutcome,
};
use crate::pipeline::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::pipeline::diff::calculate_diff;
use crate::pipeline::index::IndexBuilder;
use crate::pipeline::snapshot::{BuildResult, SnapshotBuilder, SourceOutcome};
use crate::services::{Fetcher, Reporter, SourceRegistry, Validator};
use crate::storage::{SnapshotStorage, WriteMetadata};
use crate::utils::log;

const TOTAL_STEPS: usize = 5;

/// Run the full update pipeline against `storage`.
pub async fn run_update(
    config: &Config,
    storage: &dyn SnapshotStorage,
    reporter: &Reporter,
) -> Result<RunReport> {
    let started_at = Utc::now();
    config.validate()?;
    log::header("List mirror update");

    let fetcher = Fetcher::new(&config.fetcher)?;
    let mut registry = SourceRegistry::from_config(config)?;
    if let Some(url) = &config.catalog.url {
        extend_from_catalog(&fetcher, &mut registry, url, config.validation.default_min_rules)
            .await;
    }

    log::step(1, TOTAL_STEPS, "Load - Reading previous snapshot");
    storage.prepare().await?;
    let previous = storage.load_snapshot(&registry).await?;

    log::step(
        2,
        TOTAL_STEPS,
        &format!("Fetch - Downloading {} sources", registry.len()),
    );
    let fetches = fetcher.fetch_all(registry.list_sources(), &previous).await;

    log::step(3, TOTAL_STEPS, "Validate - Checking list structure");
    let validator = Validator::new(&config.validation);
    let outcomes = validate_all(&validator, registry.list_sources(), fetches, &previous);

    log::step(4, TOTAL_STEPS, "Snapshot - Writing list files");
    let builder = SnapshotBuilder::new(CircuitBreaker::new(CircuitBreakerConfig::from(
        &config.validation,
    )));
    let mut result = builder.build(outcomes, &previous, Utc::now());
    let written = storage.write_files(&result.snapshot, &result.changes).await?;
    apply_write_failures(&mut result, &previous, &written);
    storage.write_manifest(&result.snapshot).await?;
    log::sub_item(&format!(
        "{} files written, {} removed, {} write failures",
        written.written.len(),
        written.removed.len(),
        written.failures.len()
    ));

    let mut report = RunReport::new(started_at);
    let indexed = if config.index.enabled {
        log::step(5, TOTAL_STEPS, "Index - Building search database");
        let path = storage.index_path(&config.index.filename);
        IndexBuilder::new(&config.index)
            .build(&result.snapshot, &path)
            .map(|stats| report.indexed_rules = Some(stats.rules))
    } else {
        log::step(5, TOTAL_STEPS, "Index - Skipped");
        Ok(())
    };

    report.sources = result.reports;
    report.changes = result.changes;
    report.finished_at = Utc::now();
    reporter.report(&report).await;
    indexed?;

    log::success("Update complete");
    Ok(report)
}

/// Validate every fetch result against its source, in registry order.
///
/// A `304 Not Modified` re-validates the previously published content.
pub fn validate_all<'a>(
    validator: &Validator,
    sources: &'a [SourceSpec],
    fetches: Vec<FetchResult>,
    previous: &Snapshot,
) -> Vec<SourceOutcome<'a>> {
    sources
        .iter()
        .zip(fetches)
        .map(|(source, fetch)| {
            let outcome = match (&fetch.body, previous.get(&source.filename)) {
                (Ok(FetchedBody::NotModified), Some(old)) => {
                    log::debug(&format!("{} not modified", source.name));
                    validator.validate_published(source, &old.content)
                }
                _ => validator.validate(source, &fetch),
            };
            if let ValidationOutcome::Rejected(reason) = &outcome {
                if !reason.is_fetch_failure() {
                    log::warn(&format!("{} rejected: {}", source.name, reason));
                }
            }
            SourceOutcome {
                source,
                outcome,
                etag: fetch.etag,
                last_modified: fetch.last_modified,
            }
        })
        .collect()
}

/// Revert files that could not be written so the snapshot matches disk.
fn apply_write_failures(result: &mut BuildResult, previous: &Snapshot, written: &WriteMetadata) {
    if written.failures.is_empty() {
        return;
    }

    for report in &mut result.reports {
        let Some(message) = written.failure(&report.filename) else {
            continue;
        };
        let stale = match previous.get(&report.filename) {
            Some(old) => {
                result.snapshot.insert(report.filename.clone(), old.clone());
                true
            }
            None => {
                result.snapshot.remove(&report.filename);
                false
            }
        };
        report.status = SourceStatus::WriteFailed {
            message: message.to_string(),
            stale,
        };
    }
    result.changes = calculate_diff(previous, &result.snapshot);
}

/// Extend the registry from a list catalog; failures only warn.
async fn extend_from_catalog(
    fetcher: &Fetcher,
    registry: &mut SourceRegistry,
    url: &str,
    default_min: usize,
) {
    let fetch = fetcher.fetch_url("catalog", url, None).await;
    let bytes = match fetch.body {
        Ok(FetchedBody::Content(bytes)) => bytes,
        Ok(FetchedBody::NotModified) => {
            log::warn("List catalog: unexpected 304, using configured sources only");
            return;
        }
        Err(e) => {
            log::warn(&format!("List catalog unavailable ({}), using configured sources only", e));
            return;
        }
    };

    let added = String::from_utf8(bytes)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            registry
                .extend_from_catalog(&json, default_min)
                .map_err(|e| e.to_string())
        });
    match added {
        Ok(count) => log::info(&format!("List catalog: {} sources added", count)),
        Err(e) => log::warn(&format!("List catalog ignored: {}", e)),
    }
}
