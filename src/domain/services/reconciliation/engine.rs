//! Reconciliation Engine
//!
//! Runs the configured flows one after the other. A fatal error in one flow
//! (dedup store failure, bad wiring) is recorded and the next flow still runs.

use super::deposit_flow::DepositReconciler;
use super::report::FlowReport;
use super::withdrawal_flow::WithdrawalReconciler;
use crate::domain::repositories::Flow;
use tracing::{error, info};

/// Outcome of one engine pass
#[derive(Debug, Default)]
pub struct RunReport {
    pub flows: Vec<FlowReport>,
    pub failures: Vec<(Flow, String)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.flows.iter().any(FlowReport::is_degraded)
    }

    pub fn total_alerts(&self) -> usize {
        self.flows.iter().map(|r| r.alerts_sent + r.alerts_failed).sum()
    }

    pub fn flow(&self, flow: Flow) -> Option<&FlowReport> {
        self.flows.iter().find(|r| r.flow == flow)
    }
}

#[derive(Default)]
pub struct ReconciliationEngine {
    deposits: Option<DepositReconciler>,
    withdrawals: Option<WithdrawalReconciler>,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deposits(mut self, reconciler: DepositReconciler) -> Self {
        self.deposits = Some(reconciler);
        self
    }

    pub fn with_withdrawals(mut self, reconciler: WithdrawalReconciler) -> Self {
        self.withdrawals = Some(reconciler);
        self
    }

    /// One bounded pass; `now_ms` is captured once and shared by both flows
    pub async fn run(&self, now_ms: i64) -> RunReport {
        let mut run = RunReport::default();

        if let Some(deposits) = &self.deposits {
            match deposits.run(now_ms).await {
                Ok(report) => run.flows.push(report),
                Err(e) => {
                    error!("[deposits] flow aborted: {}", e);
                    run.failures.push((Flow::Deposits, e.to_string()));
                }
            }
        }

        if let Some(withdrawals) = &self.withdrawals {
            match withdrawals.run(now_ms).await {
                Ok(report) => run.flows.push(report),
                Err(e) => {
                    error!("[withdrawals] flow aborted: {}", e);
                    run.failures.push((Flow::Withdrawals, e.to_string()));
                }
            }
        }

        info!(
            "Reconciliation pass finished: {} flows, {} alerts, {} failures{}",
            run.flows.len(),
            run.total_alerts(),
            run.failures.len(),
            if run.is_degraded() { " (degraded)" } else { "" }
        );

        run
    }
}
