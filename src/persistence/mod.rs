//! Persistence Layer
//!
//! Durable dedup state for the reconciliation flows, kept in SQLite via sqlx.
//!
//! # Database Schema
//!
//! ## processed_deposits / processed_withdrawals
//! - record_id: TEXT PRIMARY KEY (deposit id or BI transaction id)
//! - processed_at: Timestamp of the first mark, for operators
//!
//! Rows are never updated or deleted.

pub mod dedup_repository;

pub use dedup_repository::SqliteDedupStore;

use crate::domain::repositories::Flow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/fundwatch.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log every statement at debug level
    pub log_queries: bool,
}

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/fundwatch.db";

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 1,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Single-connection in-memory database; each connection would otherwise see its own copy
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            log_queries: false,
        }
    }
}

/// Initialize the database connection pool
///
/// Creates the data directory for file-backed URLs and runs the migrations.
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .log_statements(level);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        // keep the in-memory database alive for the whole run
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Create one dedup table per flow
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for flow in [Flow::Deposits, Flow::Withdrawals] {
        let table = flow.table_name();
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                record_id TEXT PRIMARY KEY,
                processed_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            table
        ))
        .execute(pool)
        .await
        .map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}
