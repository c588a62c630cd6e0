//! SQLite-backed dedup store
//!
//! One instance per flow; the flow picks the table.

use super::DbPool;
use crate::domain::errors::StoreError;
use crate::domain::repositories::{DedupStore, Flow};
use async_trait::async_trait;
use tracing::{debug, error};

pub struct SqliteDedupStore {
    pool: DbPool,
    flow: Flow,
}

impl SqliteDedupStore {
    pub fn new(pool: DbPool, flow: Flow) -> Self {
        Self { pool, flow }
    }

    /// Number of records marked so far
    pub async fn count(&self) -> Result<i64, StoreError> {
        let row: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {}",
            self.flow.table_name()
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }
}

#[async_trait]
impl DedupStore for SqliteDedupStore {
    fn flow(&self) -> Flow {
        self.flow
    }

    async fn has(&self, record_id: &str) -> Result<bool, StoreError> {
        let found: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT 1 FROM {} WHERE record_id = ?1",
            self.flow.table_name()
        ))
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("[{}] failed to look up {}: {}", self.flow, record_id, e);
            e
        })?;

        Ok(found.is_some())
    }

    async fn mark_processed(&self, record_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (record_id) VALUES (?1) ON CONFLICT(record_id) DO NOTHING",
            self.flow.table_name()
        ))
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("[{}] failed to mark {}: {}", self.flow, record_id, e);
            e
        })?;

        let inserted = result.rows_affected() == 1;
        debug!(
            "[{}] {} {}",
            self.flow,
            record_id,
            if inserted { "marked processed" } else { "was already marked" }
        );
        Ok(inserted)
    }
}
