//! Per-source fetch results.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Terminal reason a fetch produced no content.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("server responded with HTTP {status}")]
    Status { status: u16 },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("response exceeds {limit} bytes")]
    Oversize { limit: u64 },

    #[error("URL refused: {reason}")]
    Blocked { reason: String },

    #[error("run deadline reached before the fetch completed")]
    Cancelled,
}

impl FetchError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
            FetchError::Status { status } => *status >= 500 || *status == 429,
            FetchError::Oversize { .. } | FetchError::Blocked { .. } | FetchError::Cancelled => {
                false
            }
        }
    }
}

/// Body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedBody {
    Content(Vec<u8>),
    /// Server answered `304 Not Modified` to a conditional request.
    NotModified,
}

/// Outcome of fetching one source in one run.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Source name
    pub source: String,
    /// Final body or the terminal error
    pub body: std::result::Result<FetchedBody, FetchError>,
    /// Last HTTP status seen, if any response arrived
    pub status: Option<u16>,
    /// Number of attempts made
    pub attempts: u32,
    /// Wall-clock time across all attempts
    pub duration: Duration,
    pub fetched_at: DateTime<Utc>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FetchResult {
    /// Failed fetch.
    pub fn failed(source: impl Into<String>, error: FetchError) -> Self {
        Self::with_body(source, Err(error))
    }

    pub fn with_body(
        source: impl Into<String>,
        body: std::result::Result<FetchedBody, FetchError>,
    ) -> Self {
        Self {
            source: source.into(),
            body,
            status: None,
            attempts: 1,
            duration: Duration::ZERO,
            fetched_at: Utc::now(),
            etag: None,
            last_modified: None,
        }
    }
}

/// Cache validators from a previous fetch, used for conditional requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Conditional {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout { secs: 1 }.is_transient());
        assert!(FetchError::Status { status: 503 }.is_transient());
        assert!(
            FetchError::Transport {
                message: "connection reset".into()
            }
            .is_transient()
        );
        assert!(!FetchError::Status { status: 404 }.is_transient());
        assert!(!FetchError::Status { status: 403 }.is_transient());
        assert!(!FetchError::Oversize { limit: 10 }.is_transient());
        assert!(!FetchError::Cancelled.is_transient());
    }
}
