//! Client identity resolution for deposit alerts
//!
//! Two strategies exist: a [`SubAccountDirectory`] built once per run from the
//! exchange's sub-account listing, or a live BI lookup per flagged deposit
//! ([`BiIdentityLookup`]). Both degrade to [`ClientInfo::unknown`].

use crate::domain::entities::ClientInfo;
use crate::domain::repositories::ledger_source::DEFAULT_MAX_PAGES;
use crate::domain::repositories::{BusinessRecordSource, LedgerSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn resolve(&self, sub_account_id: &str) -> ClientInfo;

    /// Set when some identities are known to be missing for this run
    fn degraded_reason(&self) -> Option<String> {
        None
    }
}

/// Sub-account id → identity, complete for the run unless a listing page failed
#[derive(Debug, Clone)]
pub struct SubAccountDirectory {
    entries: HashMap<String, ClientInfo>,
    complete: bool,
}

impl Default for SubAccountDirectory {
    fn default() -> Self {
        Self::from_entries(Vec::new())
    }
}

impl SubAccountDirectory {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ClientInfo)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            complete: true,
        }
    }

    /// Page through the sub-account listing until a short page.
    ///
    /// A failed page stops the walk and leaves the directory incomplete; the
    /// run continues with what was collected.
    pub async fn build(source: &dyn LedgerSource, page_size: u32) -> Self {
        let mut entries = HashMap::new();
        let mut complete = true;
        let mut page = 1;

        if page_size == 0 {
            warn!("Sub-account page size is zero, directory left empty");
            return Self {
                entries,
                complete: false,
            };
        }

        loop {
            if page > DEFAULT_MAX_PAGES {
                warn!("Sub-account listing exceeded {} pages, stopping", DEFAULT_MAX_PAGES);
                complete = false;
                break;
            }

            match source.fetch_sub_accounts(page, page_size).await {
                Ok(accounts) => {
                    let fetched = accounts.len();
                    for account in accounts {
                        let info = ClientInfo {
                            email: account.email,
                            ..ClientInfo::default()
                        };
                        entries.insert(account.id, info);
                    }
                    if fetched < page_size as usize {
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    warn!(
                        "Sub-account listing failed on page {}: {}. Unresolved emails will show as unknown",
                        page, e
                    );
                    complete = false;
                    break;
                }
            }
        }

        info!(
            "Sub-account directory built: {} entries ({})",
            entries.len(),
            if complete { "complete" } else { "incomplete" }
        );

        Self { entries, complete }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn get(&self, sub_account_id: &str) -> ClientInfo {
        self.entries
            .get(sub_account_id)
            .cloned()
            .unwrap_or_else(ClientInfo::unknown)
    }
}

#[async_trait]
impl IdentityLookup for SubAccountDirectory {
    async fn resolve(&self, sub_account_id: &str) -> ClientInfo {
        self.get(sub_account_id)
    }

    fn degraded_reason(&self) -> Option<String> {
        if self.complete {
            None
        } else {
            Some(format!(
                "sub-account directory incomplete ({} entries), some emails unknown",
                self.entries.len()
            ))
        }
    }
}

/// Per-record enrichment through the BI client lookup
pub struct BiIdentityLookup {
    source: Arc<dyn BusinessRecordSource>,
}

impl BiIdentityLookup {
    pub fn new(source: Arc<dyn BusinessRecordSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl IdentityLookup for BiIdentityLookup {
    async fn resolve(&self, sub_account_id: &str) -> ClientInfo {
        self.source.fetch_client_info(sub_account_id).await
    }
}
