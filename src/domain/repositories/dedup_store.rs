//! Dedup Store Trait
//!
//! Durable set of record ids that already completed evaluation. One store
//! instance covers one [`Flow`]; deposit and withdrawal ids live in separate
//! namespaces.
//!
//! `mark_processed` must be idempotent: marking an existing id is a no-op that
//! reports `false`.

use crate::domain::errors::StoreError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Reconciliation flow owning a dedup namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    Deposits,
    Withdrawals,
}

impl Flow {
    /// Backing table of the namespace
    pub fn table_name(&self) -> &'static str {
        match self {
            Flow::Deposits => "processed_deposits",
            Flow::Withdrawals => "processed_withdrawals",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Flow::Deposits => "deposits",
                Flow::Withdrawals => "withdrawals",
            }
        )
    }
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    fn flow(&self) -> Flow;

    async fn has(&self, record_id: &str) -> Result<bool, StoreError>;

    /// Returns `true` when the id was newly recorded
    async fn mark_processed(&self, record_id: &str) -> Result<bool, StoreError>;
}

/// Process-local store, used in tests and behind [`ShadowDedupStore`]
pub struct InMemoryDedupStore {
    flow: Flow,
    ids: Mutex<HashSet<String>>,
}

impl InMemoryDedupStore {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            ids: Mutex::new(HashSet::new()),
        }
    }

    // Single-operation updates: a poisoned set is still consistent
    fn ids(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    fn flow(&self) -> Flow {
        self.flow
    }

    async fn has(&self, record_id: &str) -> Result<bool, StoreError> {
        Ok(self.ids().contains(record_id))
    }

    async fn mark_processed(&self, record_id: &str) -> Result<bool, StoreError> {
        Ok(self.ids().insert(record_id.to_string()))
    }
}

/// Reads through to a durable store but keeps new marks in memory only.
///
/// Used for dry runs: previously processed ids are still suppressed, and the
/// durable namespace is left untouched.
pub struct ShadowDedupStore {
    inner: Arc<dyn DedupStore>,
    shadow: InMemoryDedupStore,
}

impl ShadowDedupStore {
    pub fn new(inner: Arc<dyn DedupStore>) -> Self {
        let flow = inner.flow();
        Self {
            inner,
            shadow: InMemoryDedupStore::new(flow),
        }
    }
}

#[async_trait]
impl DedupStore for ShadowDedupStore {
    fn flow(&self) -> Flow {
        self.inner.flow()
    }

    async fn has(&self, record_id: &str) -> Result<bool, StoreError> {
        if self.shadow.has(record_id).await? {
            return Ok(true);
        }
        self.inner.has(record_id).await
    }

    async fn mark_processed(&self, record_id: &str) -> Result<bool, StoreError> {
        if self.inner.has(record_id).await? {
            return Ok(false);
        }
        self.shadow.mark_processed(record_id).await
    }
}
