//! Per-flow run report and notification failure policy.

use crate::domain::errors::ReconciliationError;
use crate::domain::repositories::{DedupStore, Flow, Notifier};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};

/// What to do with a record whose alert could not be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyFailurePolicy {
    /// Mark it processed anyway; the failure only shows up in the logs
    #[default]
    MarkProcessed,
    /// Leave it unmarked so the next run alerts again
    RetryNextRun,
}

impl FromStr for NotifyFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mark" | "mark_processed" => Ok(Self::MarkProcessed),
            "retry" | "retry_next_run" => Ok(Self::RetryNextRun),
            other => Err(format!("unknown notify failure policy '{}'", other)),
        }
    }
}

/// Outcome of one flow over one run
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow: Flow,
    pub started_at: DateTime<Utc>,
    pub windows_scanned: usize,
    pub pages_fetched: u32,
    /// Ledger records (deposits) or business records (withdrawals) seen
    pub records_seen: usize,
    /// Records that needed evaluation: flagged deposits or business withdrawals
    pub candidates: usize,
    pub already_processed: usize,
    pub matched: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
    pub marked: usize,
    /// Fetches that failed; their data was not evaluated
    pub degraded: Vec<String>,
}

impl FlowReport {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            started_at: Utc::now(),
            windows_scanned: 0,
            pages_fetched: 0,
            records_seen: 0,
            candidates: 0,
            already_processed: 0,
            matched: 0,
            alerts_sent: 0,
            alerts_failed: 0,
            marked: 0,
            degraded: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    pub fn add_degraded(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("[{}] degraded: {}", self.flow, reason);
        self.degraded.push(reason);
    }

    pub fn log_summary(&self) {
        if self.is_degraded() {
            warn!("{}", self);
            for reason in &self.degraded {
                warn!("  - {}", reason);
            }
        } else {
            info!("{}", self);
        }
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] windows={} pages={} seen={} candidates={} skipped={} matched={} alerts_sent={} alerts_failed={} marked={} status={}",
            self.flow,
            self.windows_scanned,
            self.pages_fetched,
            self.records_seen,
            self.candidates,
            self.already_processed,
            self.matched,
            self.alerts_sent,
            self.alerts_failed,
            self.marked,
            if self.is_degraded() { "DEGRADED" } else { "OK" }
        )
    }
}

/// Commit `record_id` as processed and count it
pub(crate) async fn mark(
    store: &dyn DedupStore,
    record_id: &str,
    report: &mut FlowReport,
) -> Result<(), ReconciliationError> {
    if store.mark_processed(record_id).await? {
        report.marked += 1;
    }
    Ok(())
}

/// Echo, send, then mark according to `policy`
pub(crate) async fn dispatch_and_mark(
    notifier: &dyn Notifier,
    store: &dyn DedupStore,
    policy: NotifyFailurePolicy,
    record_id: &str,
    message: &str,
    report: &mut FlowReport,
) -> Result<(), ReconciliationError> {
    info!("[{}] alert for {}:\n{}", report.flow, record_id, message);

    match notifier.send(message).await {
        Ok(()) => {
            report.alerts_sent += 1;
        }
        Err(e) => {
            report.alerts_failed += 1;
            error!(
                "[{}] {} failed to deliver alert for {}: {}",
                report.flow,
                notifier.name(),
                record_id,
                e
            );
            if policy == NotifyFailurePolicy::RetryNextRun {
                warn!("[{}] leaving {} unmarked for the next run", report.flow, record_id);
                return Ok(());
            }
        }
    }

    mark(store, record_id, report).await
}
