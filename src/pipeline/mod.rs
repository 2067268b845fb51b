//! Pipeline stages for a list mirror run.
//!
//! - `run_update`: Registry → Fetch → Validate → Snapshot → Index → Report
//! - `SnapshotBuilder`: merge validation outcomes with the previous snapshot
//! - `IndexBuilder`: rebuild the full-text search database

pub mod circuit_breaker;
pub mod diff;
pub mod index;
pub mod run;
pub mod snapshot;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use diff::calculate_diff;
pub use index::{IndexBuilder, SearchHit, search};
pub use run::run_update;
pub use snapshot::{BuildResult, SnapshotBuilder, SourceOutcome};
