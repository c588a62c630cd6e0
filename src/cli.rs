//! CLI argument parsing using clap.

use crate::config::{FlowSelection, RunOptions};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// fundwatch - reconcile exchange deposits and withdrawals against the BI system
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Which reconciliation flow to run
    #[command(subcommand)]
    pub command: Commands,

    /// Log alerts instead of sending them and keep processed marks in memory
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// First day of the deposit scan (overrides DEPOSIT_START_DATE)
    #[arg(long, global = true, value_name = "YYYY-MM-DD")]
    pub since: Option<NaiveDate>,

    /// Withdrawal lookback in hours (overrides WITHDRAWAL_LOOKBACK_HOURS)
    #[arg(long, global = true, value_name = "HOURS")]
    pub lookback_hours: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Alert on deposits held for travel-rule confirmation
    Deposits,
    /// Alert on BI withdrawals missing from the exchange history
    Withdrawals,
    /// Run both flows, deposits first
    All,
}

impl Cli {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            flows: match self.command {
                Commands::Deposits => FlowSelection::Deposits,
                Commands::Withdrawals => FlowSelection::Withdrawals,
                Commands::All => FlowSelection::All,
            },
            dry_run: self.dry_run,
            since: self.since,
            lookback_hours: self.lookback_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flow_and_flags() {
        let cli = Cli::try_parse_from([
            "fundwatch",
            "--dry-run",
            "deposits",
            "--since",
            "2025-06-01",
        ])
        .unwrap();

        let options = cli.run_options();
        assert_eq!(options.flows, FlowSelection::Deposits);
        assert!(options.dry_run);
        assert_eq!(options.since, NaiveDate::from_ymd_opt(2025, 6, 1));
        assert_eq!(options.lookback_hours, None);
    }

    #[test]
    fn test_parse_all_with_lookback() {
        let cli = Cli::try_parse_from(["fundwatch", "all", "--lookback-hours", "72"]).unwrap();
        let options = cli.run_options();
        assert_eq!(options.flows, FlowSelection::All);
        assert!(!options.dry_run);
        assert_eq!(options.lookback_hours, Some(72));
    }

    #[test]
    fn test_flow_is_required() {
        assert!(Cli::try_parse_from(["fundwatch", "--dry-run"]).is_err());
        assert!(Cli::try_parse_from(["fundwatch", "balances"]).is_err());
        assert!(Cli::try_parse_from(["fundwatch", "deposits", "--since", "30/04/2025"]).is_err());
    }
}
