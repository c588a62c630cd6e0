//! Withdrawal confirmation flow
//!
//! Every outgoing transaction known to the BI system must show up in the
//! exchange's withdrawal history for the trailing window. Each business record
//! is evaluated once: it is marked processed whether or not it matched.

use super::report::{dispatch_and_mark, mark, FlowReport, NotifyFailurePolicy};
use crate::domain::entities::window::{MILLIS_PER_DAY, MILLIS_PER_HOUR};
use crate::domain::entities::{LedgerRecord, RecordKind, TimeWindow};
use crate::domain::errors::{LedgerResult, ReconciliationError};
use crate::domain::repositories::ledger_source::DEFAULT_MAX_PAGES;
use crate::domain::repositories::{BusinessRecordSource, DedupStore, Flow, LedgerSource, Notifier, Pager};
use crate::domain::services::alerts::missing_withdrawal_alert;
use crate::domain::services::matcher::WithdrawalMatcher;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct WithdrawalFlowConfig {
    pub lookback_ms: i64,
    pub page_limit: u32,
    /// Longest range the withdrawal history endpoint accepts in one query
    pub max_query_span_ms: i64,
    pub max_pages_per_window: u32,
    pub notify_failure_policy: NotifyFailurePolicy,
}

impl Default for WithdrawalFlowConfig {
    fn default() -> Self {
        Self {
            lookback_ms: 48 * MILLIS_PER_HOUR,
            page_limit: 1000,
            max_query_span_ms: 90 * MILLIS_PER_DAY,
            max_pages_per_window: DEFAULT_MAX_PAGES,
            notify_failure_policy: NotifyFailurePolicy::MarkProcessed,
        }
    }
}

pub struct WithdrawalReconciler {
    ledger: Arc<dyn LedgerSource>,
    business: Arc<dyn BusinessRecordSource>,
    store: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    matcher: WithdrawalMatcher,
    config: WithdrawalFlowConfig,
}

impl WithdrawalReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        business: Arc<dyn BusinessRecordSource>,
        store: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
        matcher: WithdrawalMatcher,
        config: WithdrawalFlowConfig,
    ) -> Self {
        Self {
            ledger,
            business,
            store,
            notifier,
            matcher,
            config,
        }
    }

    pub async fn run(&self, now_ms: i64) -> Result<FlowReport, ReconciliationError> {
        if self.store.flow() != Flow::Withdrawals {
            return Err(ReconciliationError::Configuration(format!(
                "withdrawal flow given the {} dedup namespace",
                self.store.flow()
            )));
        }
        if self.config.lookback_ms <= 0 || self.config.page_limit == 0 {
            return Err(ReconciliationError::Configuration(
                "withdrawal lookback and page limit must be positive".to_string(),
            ));
        }

        let mut report = FlowReport::new(Flow::Withdrawals);

        let outgoing = match self.business.fetch_outgoing().await {
            Ok(records) => records,
            Err(e) => {
                report.add_degraded(format!("business records unavailable: {}", e));
                report.log_summary();
                return Ok(report);
            }
        };
        report.records_seen = outgoing.len();

        let window = TimeWindow::trailing(now_ms, self.config.lookback_ms);
        let ledger = match self.fetch_ledger(window, &mut report).await {
            Ok(records) => records,
            Err(e) => {
                // Without the ledger every record would look unmatched
                report.add_degraded(format!(
                    "ledger withdrawals for {} unavailable, nothing evaluated: {}",
                    window, e
                ));
                report.log_summary();
                return Ok(report);
            }
        };
        info!(
            "[withdrawals] {} business records vs {} exchange withdrawals in {}",
            outgoing.len(),
            ledger.len(),
            window
        );

        for record in &outgoing {
            report.candidates += 1;

            if self.store.has(&record.id).await? {
                debug!("[withdrawals] {} already checked, skipping", record.id);
                report.already_processed += 1;
                continue;
            }

            match self.matcher.find_match(record, &ledger) {
                Some(found) => {
                    debug!("[withdrawals] {} corroborated by ledger {}", record.id, found.id);
                    report.matched += 1;
                    mark(self.store.as_ref(), &record.id, &mut report).await?;
                }
                None => {
                    let message = missing_withdrawal_alert(record, ledger.len(), &window);
                    dispatch_and_mark(
                        self.notifier.as_ref(),
                        self.store.as_ref(),
                        self.config.notify_failure_policy,
                        &record.id,
                        &message,
                        &mut report,
                    )
                    .await?;
                }
            }
        }

        report.log_summary();
        Ok(report)
    }

    async fn fetch_ledger(
        &self,
        window: TimeWindow,
        report: &mut FlowReport,
    ) -> LedgerResult<Vec<LedgerRecord>> {
        let mut records = Vec::new();

        for piece in window.split(self.config.max_query_span_ms.max(1)) {
            report.windows_scanned += 1;
            let mut pager = Pager::new(
                self.ledger.as_ref(),
                RecordKind::Withdrawal,
                piece,
                self.config.page_limit,
            )
            .with_max_pages(self.config.max_pages_per_window);

            let result = loop {
                match pager.next_page().await {
                    Ok(Some(page)) => records.extend(page),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            };
            report.pages_fetched += pager.pages_fetched();
            result?;
        }

        Ok(records)
    }
}
