//! Circuit breaker on per-list rule counts.
//!
//! Refuses to publish a list whose rule count collapsed against the
//! previous snapshot. A truncated upstream file that still clears its
//! absolute threshold is rejected here, and the previous content is
//! kept.

use crate::models::{RejectReason, ValidationConfig};

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Maximum allowed drop percentage (0-100). 100 disables the guard.
    pub max_drop_percent: u8,
    /// Previous rule count below which the check is skipped.
    pub min_baseline: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::from(&ValidationConfig::default())
    }
}

impl From<&ValidationConfig> for CircuitBreakerConfig {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            max_drop_percent: config.max_drop_percent.min(100),
            min_baseline: config.min_baseline,
        }
    }
}

/// Result of a circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to publish
    Safe { current: usize, previous: usize },
    /// No previous list, or previous below baseline
    ColdStart { current: usize },
    /// Drop exceeds the threshold
    Triggered {
        current: usize,
        previous: usize,
        drop_percent: f64,
    },
}

/// Guard against sudden rule count collapses.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Compare a candidate rule count with the previously published one.
    pub fn check(&self, current: usize, previous: Option<usize>) -> CircuitBreakerResult {
        let previous = match previous {
            Some(previous) if previous >= self.config.min_baseline.max(1) => previous,
            _ => return CircuitBreakerResult::ColdStart { current },
        };

        if current < previous {
            let drop_percent = (previous - current) as f64 / previous as f64 * 100.0;
            if drop_percent > f64::from(self.config.max_drop_percent) {
                return CircuitBreakerResult::Triggered {
                    current,
                    previous,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe { current, previous }
    }

    /// Check a source and convert a trip into a rejection.
    pub fn guard(
        &self,
        source: &str,
        current: usize,
        previous: Option<usize>,
    ) -> std::result::Result<(), RejectReason> {
        match self.check(current, previous) {
            CircuitBreakerResult::Safe { .. } | CircuitBreakerResult::ColdStart { .. } => Ok(()),
            CircuitBreakerResult::Triggered {
                current,
                previous,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker: TRIGGERED for {}! {} → {} rules ({:.1}% drop > {}% threshold)",
                    source,
                    previous,
                    current,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(RejectReason::SuspiciousDrop {
                    previous,
                    current,
                    drop_percent,
                })
            }
        }
    }
}
