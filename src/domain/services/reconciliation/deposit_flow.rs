//! Deposit confirmation flow
//!
//! Scans `[start, now)` window by window for deposits held by the travel-rule
//! check and alerts once per deposit id.

use super::report::{dispatch_and_mark, FlowReport, NotifyFailurePolicy};
use crate::domain::entities::window::MILLIS_PER_DAY;
use crate::domain::entities::{ClientInfo, LedgerRecord, RecordKind, TimeWindow};
use crate::domain::errors::ReconciliationError;
use crate::domain::repositories::ledger_source::DEFAULT_MAX_PAGES;
use crate::domain::repositories::{DedupStore, Flow, LedgerSource, Notifier, Pager};
use crate::domain::services::alerts::deposit_alert;
use crate::domain::services::identity::IdentityLookup;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DepositFlowConfig {
    /// First millisecond of the scanned range
    pub start_ms: i64,
    pub window_span_ms: i64,
    pub page_limit: u32,
    /// Travel-rule status code meaning "needs manual confirmation"
    pub travel_rule_flag: i64,
    pub max_pages_per_window: u32,
    pub notify_failure_policy: NotifyFailurePolicy,
}

impl Default for DepositFlowConfig {
    fn default() -> Self {
        Self {
            start_ms: 1_745_971_200_000, // 2025-04-30T00:00:00Z
            window_span_ms: 7 * MILLIS_PER_DAY,
            page_limit: 500,
            travel_rule_flag: 1,
            max_pages_per_window: DEFAULT_MAX_PAGES,
            notify_failure_policy: NotifyFailurePolicy::MarkProcessed,
        }
    }
}

pub struct DepositReconciler {
    ledger: Arc<dyn LedgerSource>,
    identity: Arc<dyn IdentityLookup>,
    store: Arc<dyn DedupStore>,
    notifier: Arc<dyn Notifier>,
    config: DepositFlowConfig,
}

impl DepositReconciler {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        identity: Arc<dyn IdentityLookup>,
        store: Arc<dyn DedupStore>,
        notifier: Arc<dyn Notifier>,
        config: DepositFlowConfig,
    ) -> Self {
        Self {
            ledger,
            identity,
            store,
            notifier,
            config,
        }
    }

    /// Scan every window up to `now_ms` (captured once by the caller)
    pub async fn run(&self, now_ms: i64) -> Result<FlowReport, ReconciliationError> {
        if self.store.flow() != Flow::Deposits {
            return Err(ReconciliationError::Configuration(format!(
                "deposit flow given the {} dedup namespace",
                self.store.flow()
            )));
        }
        if self.config.window_span_ms <= 0 || self.config.page_limit == 0 {
            return Err(ReconciliationError::Configuration(
                "deposit window span and page limit must be positive".to_string(),
            ));
        }

        let mut report = FlowReport::new(Flow::Deposits);
        if let Some(reason) = self.identity.degraded_reason() {
            report.add_degraded(reason);
        }
        let windows = TimeWindow::tile(self.config.start_ms, now_ms, self.config.window_span_ms);
        info!(
            "[deposits] scanning {} windows from {} via {}",
            windows.len(),
            TimeWindow::new(self.config.start_ms, now_ms),
            self.ledger.name()
        );

        for window in windows {
            self.scan_window(window, &mut report).await?;
        }

        report.log_summary();
        Ok(report)
    }

    async fn scan_window(
        &self,
        window: TimeWindow,
        report: &mut FlowReport,
    ) -> Result<(), ReconciliationError> {
        report.windows_scanned += 1;
        let mut pager = Pager::new(
            self.ledger.as_ref(),
            RecordKind::Deposit,
            window,
            self.config.page_limit,
        )
        .with_max_pages(self.config.max_pages_per_window);

        loop {
            match pager.next_page().await {
                Ok(Some(page)) => {
                    report.records_seen += page.len();
                    for deposit in page
                        .iter()
                        .filter(|d| d.is_travel_rule_flagged(self.config.travel_rule_flag))
                    {
                        self.evaluate(deposit, report).await?;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    report.add_degraded(format!("deposit window {} failed: {}", window, e));
                    break;
                }
            }
        }

        report.pages_fetched += pager.pages_fetched();
        Ok(())
    }

    async fn evaluate(
        &self,
        deposit: &LedgerRecord,
        report: &mut FlowReport,
    ) -> Result<(), ReconciliationError> {
        report.candidates += 1;

        if self.store.has(&deposit.id).await? {
            debug!("[deposits] {} already processed, skipping", deposit.id);
            report.already_processed += 1;
            return Ok(());
        }

        let client = match deposit.sub_account_id.as_deref() {
            Some(sub_account_id) => self.identity.resolve(sub_account_id).await,
            None => ClientInfo::unknown(),
        };
        let message = deposit_alert(deposit, &client);

        dispatch_and_mark(
            self.notifier.as_ref(),
            self.store.as_ref(),
            self.config.notify_failure_policy,
            &deposit.id,
            &message,
            report,
        )
        .await
    }
}
