//! Reconciliation module
//!
//! The deposit and withdrawal confirmation flows, the engine that drives them,
//! and the report both produce.

pub mod deposit_flow;
pub mod engine;
pub mod report;
pub mod withdrawal_flow;

pub use deposit_flow::{DepositFlowConfig, DepositReconciler};
pub use engine::{ReconciliationEngine, RunReport};
pub use report::{FlowReport, NotifyFailurePolicy};
pub use withdrawal_flow::{WithdrawalFlowConfig, WithdrawalReconciler};
