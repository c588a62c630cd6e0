pub mod alerts;
pub mod identity;
pub mod matcher;
pub mod reconciliation;

pub use identity::{BiIdentityLookup, IdentityLookup, SubAccountDirectory};
pub use matcher::{Mismatch, WithdrawalMatcher};
