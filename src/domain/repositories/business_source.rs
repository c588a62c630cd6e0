//! Business Record Source Trait
//!
//! The BI system's view of client-facing transactions. It is the ground truth
//! the ledger has to corroborate.

use crate::domain::entities::{BusinessRecord, ClientInfo};
use crate::domain::errors::SourceResult;
use async_trait::async_trait;

#[async_trait]
pub trait BusinessRecordSource: Send + Sync {
    /// Full list of outgoing (withdrawal) intents in the BI query scope
    async fn fetch_outgoing(&self) -> SourceResult<Vec<BusinessRecord>>;

    /// Identity of the client owning `sub_account_id`.
    ///
    /// Never fails: any lookup problem yields [`ClientInfo::unknown`].
    async fn fetch_client_info(&self, sub_account_id: &str) -> ClientInfo;
}
