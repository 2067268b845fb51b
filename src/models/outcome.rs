//! Validation outcomes.

use std::fmt;

use serde::Serialize;

use super::FetchError;

/// Why a source's content was not accepted this run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Fetch never produced content
    Fetch { error: FetchError },
    /// Bytes are not valid UTF-8
    Encoding { message: String },
    /// A line violates the declared syntax
    Malformed { line: usize, message: String },
    /// Fewer rule lines than the source threshold
    TooFew { found: usize, required: usize },
    /// The source's custom check did not hold
    CustomCheckFailed { message: String },
    /// Embedded checksum header disagrees with the content
    ChecksumMismatch { found: String, expected: String },
    /// Checksum required but absent
    ChecksumMissing,
    /// Rule count fell sharply against the previous snapshot
    SuspiciousDrop {
        previous: usize,
        current: usize,
        drop_percent: f64,
    },
}

impl RejectReason {
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, RejectReason::Fetch { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Fetch { error } => write!(f, "fetch failed: {error}"),
            RejectReason::Encoding { message } => write!(f, "invalid encoding: {message}"),
            RejectReason::Malformed { line, message } => {
                write!(f, "malformed content at line {line}: {message}")
            }
            RejectReason::TooFew { found, required } => {
                write!(f, "too few rules: {found} < {required}")
            }
            RejectReason::CustomCheckFailed { message } => {
                write!(f, "custom check failed: {message}")
            }
            RejectReason::ChecksumMismatch { found, expected } => {
                write!(f, "checksum mismatch: found {found}, expected {expected}")
            }
            RejectReason::ChecksumMissing => f.write_str("required checksum header is missing"),
            RejectReason::SuspiciousDrop {
                previous,
                current,
                drop_percent,
            } => write!(
                f,
                "rule count dropped {previous} -> {current} ({drop_percent:.1}%)"
            ),
        }
    }
}

/// Result of validating one fetched source.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Normalized content ready to be written, with its rule count.
    Accepted { content: String, rule_count: usize },
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted { .. })
    }

    pub fn reject_reason(&self) -> Option<&RejectReason> {
        match self {
            ValidationOutcome::Rejected(reason) => Some(reason),
            ValidationOutcome::Accepted { .. } => None,
        }
    }
}
