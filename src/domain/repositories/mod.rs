pub mod business_source;
pub mod dedup_store;
pub mod ledger_source;
pub mod notifier;

pub use business_source::BusinessRecordSource;
pub use dedup_store::{DedupStore, Flow, InMemoryDedupStore, ShadowDedupStore};
pub use ledger_source::{fetch_all, LedgerSource, Pager};
pub use notifier::Notifier;
