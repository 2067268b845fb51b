//! Service layer for the list mirror.
//!
//! This module contains the per-source stages of a run:
//! - Source registration (`SourceRegistry`)
//! - List fetching (`Fetcher`)
//! - Structural validation (`Validator`)
//! - Run reporting and failure forwarding (`Reporter`)

pub mod fetcher;
pub mod registry;
pub mod reporter;
pub mod validator;

pub use fetcher::Fetcher;
pub use registry::SourceRegistry;
pub use reporter::{ErrorTracker, FailureEvent, LogTracker, Reporter, WebhookTracker};
pub use validator::Validator;
