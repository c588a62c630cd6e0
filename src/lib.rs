//! fundwatch
//!
//! Reconciles Binance broker deposits and withdrawals against the BI system
//! and alerts a Telegram chat about records that need a human.

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod retry;
pub mod secrets;
