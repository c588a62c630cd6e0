//! Ledger Source Trait
//!
//! Read-only view of the exchange ledger. Implementations only need to serve
//! single pages; [`Pager`] and [`fetch_all`] turn those into the complete,
//! lazily fetched sequence for a window.
//!
//! Pagination contract: request pages with an advancing offset until a page
//! comes back shorter than `limit`. A full page always triggers one more
//! request, so the last record of a full page is never lost.

use crate::domain::entities::{LedgerRecord, RecordKind, SubAccount, TimeWindow};
use crate::domain::errors::{LedgerError, LedgerResult};
use async_trait::async_trait;
use tracing::debug;

/// Upper bound on pages requested for one window
pub const DEFAULT_MAX_PAGES: u32 = 10_000;

#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Human readable name for logs
    fn name(&self) -> &str;

    /// Fetch one page of `kind` records inside `window`
    async fn fetch_page(
        &self,
        kind: RecordKind,
        window: TimeWindow,
        offset: u32,
        limit: u32,
    ) -> LedgerResult<Vec<LedgerRecord>>;

    /// Fetch one page of the sub-account listing (`page` is 1-based)
    async fn fetch_sub_accounts(&self, page: u32, limit: u32) -> LedgerResult<Vec<SubAccount>>;
}

/// Lazy page-by-page cursor over one window
pub struct Pager<'a> {
    source: &'a dyn LedgerSource,
    kind: RecordKind,
    window: TimeWindow,
    limit: u32,
    max_pages: u32,
    offset: u32,
    pages_fetched: u32,
    exhausted: bool,
}

impl<'a> Pager<'a> {
    pub fn new(source: &'a dyn LedgerSource, kind: RecordKind, window: TimeWindow, limit: u32) -> Self {
        Self {
            source,
            kind,
            window,
            limit,
            max_pages: DEFAULT_MAX_PAGES,
            offset: 0,
            pages_fetched: 0,
            exhausted: limit == 0 || window.is_empty(),
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Number of page requests that returned successfully
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next non-empty page, or `None` once the window is exhausted.
    ///
    /// An error ends the sequence: subsequent calls return `None`.
    pub async fn next_page(&mut self) -> LedgerResult<Option<Vec<LedgerRecord>>> {
        if self.exhausted {
            return Ok(None);
        }

        if self.pages_fetched >= self.max_pages {
            self.exhausted = true;
            return Err(LedgerError::PageLimitExceeded {
                max_pages: self.max_pages,
            });
        }

        let page = match self
            .source
            .fetch_page(self.kind, self.window, self.offset, self.limit)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };
        self.pages_fetched += 1;

        debug!(
            "{} {} page at offset {} in {}: {} records",
            self.source.name(),
            self.kind,
            self.offset,
            self.window,
            page.len()
        );

        if page.len() < self.limit as usize {
            self.exhausted = true;
        } else {
            self.offset = self.offset.saturating_add(self.limit);
        }

        if page.is_empty() {
            Ok(None)
        } else {
            Ok(Some(page))
        }
    }
}

/// Collect every record of `kind` inside `window`
pub async fn fetch_all(
    source: &dyn LedgerSource,
    kind: RecordKind,
    window: TimeWindow,
    limit: u32,
) -> LedgerResult<Vec<LedgerRecord>> {
    let mut pager = Pager::new(source, kind, window, limit);
    let mut records = Vec::new();
    while let Some(page) = pager.next_page().await? {
        records.extend(page);
    }
    Ok(records)
}
