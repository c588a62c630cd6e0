//! Wiring of the configured adapters into a reconciliation engine.

use crate::config::{AppConfig, ConfigError, IdentitySource};
use crate::domain::repositories::{
    BusinessRecordSource, DedupStore, Flow, LedgerSource, Notifier, ShadowDedupStore,
};
use crate::domain::services::identity::{BiIdentityLookup, IdentityLookup, SubAccountDirectory};
use crate::domain::services::matcher::WithdrawalMatcher;
use crate::domain::services::reconciliation::{
    DepositReconciler, ReconciliationEngine, RunReport, WithdrawalReconciler,
};
use crate::infrastructure::binance_client::BinanceClient;
use crate::infrastructure::metabase_client::MetabaseClient;
use crate::infrastructure::telegram_notifier::{LogNotifier, TelegramNotifier};
use crate::persistence::{init_database, DatabaseError, DbPool, SqliteDedupStore};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to set up {component}: {reason}")]
    Setup { component: &'static str, reason: String },
}

/// A ready-to-run engine and the database it writes to
pub struct App {
    engine: ReconciliationEngine,
    pool: DbPool,
}

impl App {
    pub async fn build(config: &AppConfig) -> Result<Self, AppError> {
        let pool = init_database(&config.database).await?;

        let ledger: Arc<dyn LedgerSource> = Arc::new(
            BinanceClient::new(config.binance.clone()).map_err(|e| AppError::Setup {
                component: "exchange client",
                reason: e.to_string(),
            })?,
        );

        let notifier: Arc<dyn Notifier> = match &config.telegram {
            Some(telegram) => Arc::new(TelegramNotifier::new(telegram.clone()).map_err(|e| {
                AppError::Setup {
                    component: "telegram notifier",
                    reason: e.to_string(),
                }
            })?),
            None => {
                warn!("Dry run: alerts are logged, not sent, and nothing is persisted");
                Arc::new(LogNotifier)
            }
        };

        let business = match &config.metabase {
            Some(metabase) => {
                let client = MetabaseClient::new(metabase.clone()).map_err(|e| AppError::Setup {
                    component: "BI client",
                    reason: e.to_string(),
                })?;
                Some(Arc::new(client) as Arc<dyn BusinessRecordSource>)
            }
            None => None,
        };

        let dedup = |flow: Flow| -> Arc<dyn DedupStore> {
            let durable: Arc<dyn DedupStore> = Arc::new(SqliteDedupStore::new(pool.clone(), flow));
            if config.run.dry_run {
                Arc::new(ShadowDedupStore::new(durable))
            } else {
                durable
            }
        };

        let mut engine = ReconciliationEngine::new();

        if config.run.flows.runs_deposits() {
            let identity: Arc<dyn IdentityLookup> = match config.identity_source {
                IdentitySource::Directory => {
                    let directory =
                        SubAccountDirectory::build(ledger.as_ref(), config.sub_account_page_limit)
                            .await;
                    info!("Sub-account directory holds {} entries", directory.len());
                    Arc::new(directory)
                }
                IdentitySource::Bi => {
                    let source = business.clone().ok_or_else(|| {
                        ConfigError::Invalid("BI identity lookup without a BI client".to_string())
                    })?;
                    Arc::new(BiIdentityLookup::new(source))
                }
            };

            engine = engine.with_deposits(DepositReconciler::new(
                ledger.clone(),
                identity,
                dedup(Flow::Deposits),
                notifier.clone(),
                config.deposits.clone(),
            ));
        }

        if config.run.flows.runs_withdrawals() {
            let source = business.clone().ok_or_else(|| {
                ConfigError::Invalid("withdrawal flow without a BI client".to_string())
            })?;

            engine = engine.with_withdrawals(WithdrawalReconciler::new(
                ledger.clone(),
                source,
                dedup(Flow::Withdrawals),
                notifier.clone(),
                WithdrawalMatcher::new(config.amount_tolerance),
                config.withdrawals.clone(),
            ));
        }

        Ok(Self { engine, pool })
    }

    pub async fn run(&self, now_ms: i64) -> RunReport {
        self.engine.run(now_ms).await
    }

    pub async fn shutdown(self) {
        self.pool.close().await;
    }
}
