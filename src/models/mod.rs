// src/models/mod.rs

//! Domain models for the list updater.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod fetch;
mod outcome;
mod report;
mod snapshot;
mod source;

// Re-export all public types
pub use config::{
    CatalogConfig, Config, FetcherConfig, IndexConfig, ReportingConfig, ValidationConfig,
};
pub use fetch::{Conditional, FetchError, FetchResult, FetchedBody};
pub use outcome::{RejectReason, ValidationOutcome};
pub use report::{ChangeSet, RunCounts, RunReport, SourceReport, SourceStatus};
pub use snapshot::{Manifest, ManifestEntry, Snapshot, SnapshotFile};
pub use source::{ChecksumPolicy, CustomCheck, SourceSpec, SyntaxKind};
