// src/services/fetcher.rs

//! List fetcher service.
//!
//! Downloads every registered source concurrently under a bounded
//! worker count and a run-wide deadline. Each source gets independent
//! retries with exponential backoff; a failure in one source never
//! affects another.

use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::header::{ETAG, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::error::Result;
use crate::models::{
    Conditional, FetchError, FetchResult, FetchedBody, FetcherConfig, Snapshot, SourceSpec,
};
use crate::utils::http::create_client;
use crate::utils::log;
use crate::utils::url::UrlPolicy;

/// A single successful HTTP exchange.
struct Attempt {
    status: u16,
    body: FetchedBody,
    etag: Option<String>,
    last_modified: Option<String>,
}

/// A single failed HTTP exchange, with the status if a response arrived.
struct AttemptError {
    error: FetchError,
    status: Option<u16>,
}

impl From<FetchError> for AttemptError {
    fn from(error: FetchError) -> Self {
        Self {
            error,
            status: None,
        }
    }
}

/// Service for fetching filter lists.
pub struct Fetcher {
    config: FetcherConfig,
    client: Client,
    policy: UrlPolicy,
}

impl Fetcher {
    /// Create a new fetcher with the given configuration.
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_client(config)?,
            policy: UrlPolicy::from_config(config),
            config: config.clone(),
        })
    }

    /// Fetch all sources concurrently.
    ///
    /// Results are returned in registry order, one per source. Sources
    /// still pending when the run deadline passes are reported as
    /// `Cancelled`.
    pub async fn fetch_all(&self, sources: &[SourceSpec], previous: &Snapshot) -> Vec<FetchResult> {
        let concurrency = self.config.max_concurrent.max(1);
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.run_timeout_secs);

        let jobs: Vec<_> = sources
            .iter()
            .enumerate()
            .map(|(index, spec)| (index, spec, self.conditional_for(spec, previous)))
            .collect();

        let mut slots: Vec<Option<FetchResult>> = (0..sources.len()).map(|_| None).collect();
        let mut fetch_stream = stream::iter(jobs)
            .map(|(index, spec, conditional)| async move {
                let result = self.fetch(spec, conditional.as_ref()).await;
                (index, result)
            })
            .buffer_unordered(concurrency);

        loop {
            match tokio::time::timeout_at(deadline, fetch_stream.next()).await {
                Ok(Some((index, result))) => slots[index] = Some(result),
                Ok(None) => break,
                Err(_) => {
                    log::warn(&format!(
                        "Run deadline of {}s reached, cancelling pending fetches",
                        self.config.run_timeout_secs
                    ));
                    break;
                }
            }
        }

        slots
            .into_iter()
            .zip(sources)
            .map(|(slot, spec)| {
                slot.unwrap_or_else(|| FetchResult::failed(&spec.name, FetchError::Cancelled))
            })
            .collect()
    }

    /// Fetch a single source, retrying transient failures.
    pub async fn fetch(&self, spec: &SourceSpec, conditional: Option<&Conditional>) -> FetchResult {
        self.fetch_url(&spec.name, &spec.url, conditional).await
    }

    /// Fetch any URL under the same policy, retry and size rules.
    pub async fn fetch_url(
        &self,
        name: &str,
        raw_url: &str,
        conditional: Option<&Conditional>,
    ) -> FetchResult {
        let started = Instant::now();

        let url = match self.policy.check_str(raw_url) {
            Ok(url) => url,
            Err(reason) => {
                log::warn(&format!("Refusing to fetch {}: {}", name, reason));
                return FetchResult::failed(name, FetchError::Blocked { reason });
            }
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.attempt(&url, conditional).await {
                Ok(attempt) => {
                    log::debug(&format!(
                        "Fetched {} (HTTP {}, attempt {})",
                        name, attempt.status, attempts
                    ));
                    return FetchResult {
                        status: Some(attempt.status),
                        attempts,
                        duration: started.elapsed(),
                        fetched_at: Utc::now(),
                        etag: attempt.etag,
                        last_modified: attempt.last_modified,
                        ..FetchResult::with_body(name, Ok(attempt.body))
                    };
                }
                Err(failure) if failure.error.is_transient() && attempts < max_attempts => {
                    let delay = self.backoff(attempts);
                    log::debug(&format!(
                        "Fetch of {} failed ({}), retrying in {:?}",
                        name, failure.error, delay
                    ));
                    tokio::time::sleep(delay).await;
                }
                Err(failure) => {
                    log::warn(&format!(
                        "Failed to fetch {} ({}) after {} attempt(s): {}",
                        name, raw_url, attempts, failure.error
                    ));
                    return FetchResult {
                        status: failure.status,
                        attempts,
                        duration: started.elapsed(),
                        ..FetchResult::failed(name, failure.error)
                    };
                }
            }
        }
    }

    /// Cache validators to send for a source, if enabled and known.
    fn conditional_for(&self, spec: &SourceSpec, previous: &Snapshot) -> Option<Conditional> {
        if !self.config.conditional_requests {
            return None;
        }
        let file = previous.get(&spec.filename)?;
        let conditional = Conditional {
            etag: file.etag.clone(),
            last_modified: file.last_modified.clone(),
        };
        (!conditional.is_empty()).then_some(conditional)
    }

    /// Delay before the retry following attempt `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.config.backoff_multiplier.max(1))
            .saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.config.retry_delay_ms.saturating_mul(factor))
    }

    async fn attempt(
        &self,
        url: &Url,
        conditional: Option<&Conditional>,
    ) -> std::result::Result<Attempt, AttemptError> {
        let mut request = self.client.get(url.clone());
        if let Some(conditional) = conditional {
            if let Some(etag) = &conditional.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &conditional.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let mut response = request.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);

        if status == StatusCode::NOT_MODIFIED && conditional.is_some() {
            return Ok(Attempt {
                status: status.as_u16(),
                body: FetchedBody::NotModified,
                etag,
                last_modified,
            });
        }
        if !status.is_success() {
            return Err(AttemptError {
                error: FetchError::Status {
                    status: status.as_u16(),
                },
                status: Some(status.as_u16()),
            });
        }

        let limit = self.config.max_bytes;
        let oversize = |status: StatusCode| AttemptError {
            error: FetchError::Oversize { limit },
            status: Some(status.as_u16()),
        };
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(oversize(status));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| AttemptError {
            status: Some(status.as_u16()),
            ..self.map_error(&e)
        })? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(oversize(status));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Attempt {
            status: status.as_u16(),
            body: FetchedBody::Content(body),
            etag,
            last_modified,
        })
    }

    fn map_error(&self, error: &reqwest::Error) -> AttemptError {
        let error = if error.is_timeout() {
            FetchError::Timeout {
                secs: self.config.timeout_secs,
            }
        } else if error.is_redirect() {
            FetchError::Blocked {
                reason: error_chain(error),
            }
        } else {
            FetchError::Transport {
                message: error_chain(error),
            }
        };
        error.into()
    }
}

/// Render an error with its source chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
