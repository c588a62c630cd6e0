//! Withdrawal Matcher
//!
//! Decides whether a business-side withdrawal is corroborated by one of the
//! ledger withdrawals. A candidate matches when address, asset and network are
//! equal ignoring case, and the amounts differ by at most `tolerance` times the
//! business amount.
//!
//! The amount rule is evaluated as `|c - b| <= tolerance * |b|`, never as a
//! ratio. A zero business amount therefore only matches a zero candidate.

use crate::domain::entities::{BusinessRecord, LedgerRecord};
use rust_decimal::Decimal;
use std::fmt;
use tracing::debug;

/// Why a candidate was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    MissingAddress,
    Address,
    Asset,
    Network,
    Amount,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::MissingAddress => "candidate has no address",
                Self::Address => "address differs",
                Self::Asset => "asset differs",
                Self::Network => "network differs",
                Self::Amount => "amount outside tolerance",
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct WithdrawalMatcher {
    tolerance: Decimal,
}

impl Default for WithdrawalMatcher {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 2),
        }
    }
}

impl WithdrawalMatcher {
    /// `tolerance` is relative to the business amount (0.01 = 1%)
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance: tolerance.abs(),
        }
    }

    /// Compare one candidate against the business record
    pub fn check(&self, business: &BusinessRecord, candidate: &LedgerRecord) -> Result<(), Mismatch> {
        let address = candidate.address.as_deref().ok_or(Mismatch::MissingAddress)?;
        if !same_text(address, &business.address) {
            return Err(Mismatch::Address);
        }
        if !same_text(&candidate.asset, &business.asset) {
            return Err(Mismatch::Asset);
        }
        if !same_text(&candidate.network, &business.network) {
            return Err(Mismatch::Network);
        }
        if !self.amount_within_tolerance(business.amount, candidate.amount) {
            return Err(Mismatch::Amount);
        }
        Ok(())
    }

    fn amount_within_tolerance(&self, expected: Decimal, actual: Decimal) -> bool {
        let drift = match actual.checked_sub(expected) {
            Some(diff) => diff.abs(),
            None => return false,
        };
        match self.tolerance.checked_mul(expected.abs()) {
            Some(allowed) => drift <= allowed,
            None => false,
        }
    }

    /// First candidate corroborating `business`, if any
    pub fn find_match<'a>(
        &self,
        business: &BusinessRecord,
        candidates: &'a [LedgerRecord],
    ) -> Option<&'a LedgerRecord> {
        debug!(
            "Checking {} {} {} -> {} via {} against {} candidates",
            business.id,
            business.amount,
            business.asset,
            business.address,
            business.network,
            candidates.len()
        );

        for candidate in candidates {
            match self.check(business, candidate) {
                Ok(()) => {
                    debug!("  ✓ {} matches ledger withdrawal {}", business.id, candidate.id);
                    return Some(candidate);
                }
                Err(reason) => {
                    debug!(
                        "  ✗ ledger {} ({} {} via {}): {}",
                        candidate.id, candidate.amount, candidate.asset, candidate.network, reason
                    );
                }
            }
        }

        debug!("No ledger withdrawal matches {}", business.id);
        None
    }

    pub fn matches(&self, business: &BusinessRecord, candidates: &[LedgerRecord]) -> bool {
        self.find_match(business, candidates).is_some()
    }
}

fn same_text(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
