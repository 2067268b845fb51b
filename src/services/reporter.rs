// src/services/reporter.rs

//! Run reporting and failure forwarding.
//!
//! Renders the run summary through the log helpers and forwards one
//! structured event per terminal failure to an [`ErrorTracker`].
//! Forwarding is best effort: a tracker error is logged and never
//! changes the outcome of the run.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{FetchError, RejectReason, ReportingConfig, RunReport, SourceStatus};
use crate::utils::http::create_reporting_client;
use crate::utils::log;

/// A terminal per-source failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEvent {
    pub source: String,
    pub filename: String,
    pub kind: &'static str,
    pub message: String,
    /// Whether previous content is still being served
    pub stale: bool,
}

/// Sink for failure events.
#[async_trait]
pub trait ErrorTracker: Send + Sync {
    async fn capture(&self, event: &FailureEvent) -> Result<()>;
}

/// Tracker that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracker;

#[async_trait]
impl ErrorTracker for LogTracker {
    async fn capture(&self, event: &FailureEvent) -> Result<()> {
        log::error(&format!(
            "[{}] {} ({}): {}",
            event.kind, event.source, event.filename, event.message
        ));
        Ok(())
    }
}

/// Tracker posting each event as JSON to a webhook.
pub struct WebhookTracker {
    client: Client,
    url: String,
}

impl WebhookTracker {
    pub fn new(url: impl Into<String>, user_agent: &str, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: create_reporting_client(user_agent, timeout_secs)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ErrorTracker for WebhookTracker {
    async fn capture(&self, event: &FailureEvent) -> Result<()> {
        self.client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::reporting(format!("webhook {}: {}", self.url, e)))?;
        Ok(())
    }
}

/// Pick the tracker for a reporting configuration.
pub fn tracker_from_config(config: &ReportingConfig, user_agent: &str) -> Box<dyn ErrorTracker> {
    match &config.webhook_url {
        Some(url) => match WebhookTracker::new(url, user_agent, config.timeout_secs) {
            Ok(tracker) => Box::new(tracker),
            Err(e) => {
                log::warn(&format!("Webhook reporting disabled: {}", e));
                Box::new(LogTracker)
            }
        },
        None => Box::new(LogTracker),
    }
}

/// Failure events for every failed source in a run.
pub fn failure_events(report: &RunReport) -> Vec<FailureEvent> {
    report
        .sources
        .iter()
        .filter_map(|source| {
            let (kind, message, stale) = match &source.status {
                SourceStatus::Stale { reason } => (failure_kind(reason), reason.to_string(), true),
                SourceStatus::Missing { reason } => (failure_kind(reason), reason.to_string(), false),
                SourceStatus::WriteFailed { message, stale } => {
                    ("write_failed", message.clone(), *stale)
                }
                SourceStatus::Updated { .. } | SourceStatus::Unchanged { .. } => return None,
            };
            Some(FailureEvent {
                source: source.name.clone(),
                filename: source.filename.clone(),
                kind,
                message,
                stale,
            })
        })
        .collect()
}

/// Stable failure kind tag for a rejection.
pub fn failure_kind(reason: &RejectReason) -> &'static str {
    match reason {
        RejectReason::Fetch { error } => match error {
            FetchError::Timeout { .. } => "fetch_timeout",
            FetchError::Status { .. } | FetchError::Transport { .. } => "fetch_failed",
            FetchError::Oversize { .. } => "fetch_oversize",
            FetchError::Blocked { .. } => "fetch_blocked",
            FetchError::Cancelled => "fetch_cancelled",
        },
        RejectReason::Encoding { .. } => "rejected_encoding",
        RejectReason::Malformed { .. } => "rejected_malformed",
        RejectReason::TooFew { .. } => "rejected_too_few",
        RejectReason::CustomCheckFailed { .. } => "rejected_custom_check",
        RejectReason::ChecksumMismatch { .. } | RejectReason::ChecksumMissing => {
            "rejected_checksum"
        }
        RejectReason::SuspiciousDrop { .. } => "rejected_suspicious_drop",
    }
}

/// Service emitting the run summary and forwarding failures.
pub struct Reporter {
    tracker: Box<dyn ErrorTracker>,
}

impl Reporter {
    pub fn new(tracker: Box<dyn ErrorTracker>) -> Self {
        Self { tracker }
    }

    /// Log the summary and forward failures. Returns the number of
    /// events the tracker accepted.
    pub async fn report(&self, report: &RunReport) -> usize {
        log_summary(report);

        let mut delivered = 0;
        for event in failure_events(report) {
            match self.tracker.capture(&event).await {
                Ok(()) => delivered += 1,
                Err(e) => log::warn(&format!(
                    "Failed to report {} failure for {}: {}",
                    event.kind, event.source, e
                )),
            }
        }
        delivered
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new(Box::new(LogTracker))
    }
}

fn log_summary(report: &RunReport) {
    let counts = report.counts();
    let elapsed = report.finished_at - report.started_at;

    log::separator();
    for source in &report.sources {
        let detail = match &source.status {
            SourceStatus::Updated { rule_count } | SourceStatus::Unchanged { rule_count } => {
                format!("{} rules", rule_count)
            }
            SourceStatus::Stale { reason } | SourceStatus::Missing { reason } => reason.to_string(),
            SourceStatus::WriteFailed { message, .. } => message.clone(),
        };
        log::sub_item(&format!(
            "[{}] {} ({}): {}",
            source.status.label(),
            source.name,
            source.filename,
            detail
        ));
    }

    let mut items = vec![
        ("Sources", counts.total.to_string()),
        ("Accepted", counts.accepted.to_string()),
        ("Rejected", counts.rejected.to_string()),
        ("Fetch failed", counts.fetch_failed.to_string()),
        ("Write failed", counts.write_failed.to_string()),
        ("Stale", counts.stale.to_string()),
        ("Missing", counts.missing.to_string()),
        ("Changed", changed_summary(report)),
    ];
    if let Some(rules) = report.indexed_rules {
        items.push(("Indexed rules", rules.to_string()));
    }
    items.push(("Duration", format!("{:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)));
    log::summary("Update run", &items);
}

fn changed_summary(report: &RunReport) -> String {
    let changes = &report.changes;
    if changes.is_empty() {
        return "none".to_string();
    }
    let mut parts = Vec::new();
    for (label, files) in [
        ("added", &changes.added),
        ("updated", &changes.updated),
        ("removed", &changes.removed),
    ] {
        if !files.is_empty() {
            parts.push(format!("{} {}", label, files.join(", ")));
        }
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    use super::*;
    use crate::models::{ChangeSet, SourceReport};
    use crate::testing::{Reply, TestServer};

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<FailureEvent>>>);

    #[async_trait]
    impl ErrorTracker for Recorder {
        async fn capture(&self, event: &FailureEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl ErrorTracker for Broken {
        async fn capture(&self, _event: &FailureEvent) -> Result<()> {
            Err(AppError::reporting("collector down"))
        }
    }

    fn sample_report() -> RunReport {
        let mut report = RunReport::new(Utc::now());
        report.sources = vec![
            SourceReport::new("easylist", "easylist.txt", SourceStatus::Updated { rule_count: 5000 }),
            SourceReport::new(
                "slow",
                "slow.txt",
                SourceStatus::Stale {
                    reason: RejectReason::Fetch {
                        error: FetchError::Timeout { secs: 300 },
                    },
                },
            ),
            SourceReport::new(
                "broken",
                "broken.txt",
                SourceStatus::Missing {
                    reason: RejectReason::TooFew {
                        found: 0,
                        required: 1000,
                    },
                },
            ),
            SourceReport::new(
                "disk",
                "disk.txt",
                SourceStatus::WriteFailed {
                    message: "disk full".into(),
                    stale: false,
                },
            ),
        ];
        report.changes = ChangeSet {
            added: vec!["easylist.txt".into()],
            ..ChangeSet::default()
        };
        report
    }

    #[test]
    fn test_failure_events() {
        let events = failure_events(&sample_report());
        let kinds: Vec<_> = events.iter().map(|e| (e.source.as_str(), e.kind, e.stale)).collect();
        assert_eq!(
            kinds,
            vec![
                ("slow", "fetch_timeout", true),
                ("broken", "rejected_too_few", false),
                ("disk", "write_failed", false),
            ]
        );
    }

    #[test]
    fn test_changed_summary() {
        assert_eq!(changed_summary(&sample_report()), "added easylist.txt");
        assert_eq!(changed_summary(&RunReport::new(Utc::now())), "none");
    }

    #[tokio::test]
    async fn test_report_forwards_failures() {
        let recorder = Recorder::default();
        let reporter = Reporter::new(Box::new(recorder.clone()));

        assert_eq!(reporter.report(&sample_report()).await, 3);
        assert_eq!(recorder.0.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tracker_failure_is_swallowed() {
        let reporter = Reporter::new(Box::new(Broken));
        assert_eq!(reporter.report(&sample_report()).await, 0);
    }

    #[tokio::test]
    async fn test_webhook_tracker_posts_events() {
        let server = TestServer::start().await;
        server.route("/hook", Reply::status(204));

        let tracker = WebhookTracker::new(server.url("/hook"), "listmirror-test", 5).unwrap();
        let reporter = Reporter::new(Box::new(tracker));

        assert_eq!(reporter.report(&sample_report()).await, 3);
        assert_eq!(server.hits("/hook"), 3);
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_not_delivered() {
        let server = TestServer::start().await;
        server.route("/hook", Reply::status(500));

        let tracker = WebhookTracker::new(server.url("/hook"), "listmirror-test", 5).unwrap();
        assert!(tracker.capture(&failure_events(&sample_report())[0]).await.is_err());
    }
}
