//! Ledger and business records
//!
//! Typed views of the two systems being reconciled. Both are validated at the
//! adapter boundary; optional fields stay `Option` and are rendered as
//! `unknown` only when an alert is formatted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder shown in alerts for identity fields nobody could resolve
pub const UNKNOWN: &str = "unknown";

/// Kind of movement reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Deposit,
    Withdrawal,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Deposit => "deposit",
                Self::Withdrawal => "withdrawal",
            }
        )
    }
}

/// A deposit or withdrawal as reported by the exchange ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub kind: RecordKind,
    /// Unique within `kind`; numeric ids are stringified
    pub id: String,
    pub amount: Decimal,
    pub asset: String,
    pub network: String,
    /// Destination address for withdrawals, deposit address for deposits
    pub address: Option<String>,
    pub sub_account_id: Option<String>,
    pub tx_id: Option<String>,
    pub status: Option<i64>,
    pub travel_rule_status: Option<i64>,
    pub inserted_at: Option<DateTime<Utc>>,
}

impl LedgerRecord {
    /// True when the deposit is held for a travel-rule confirmation
    pub fn is_travel_rule_flagged(&self, flag_code: i64) -> bool {
        self.travel_rule_status == Some(flag_code)
    }
}

/// Identity metadata attached to an alert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub email: Option<String>,
    pub name: Option<String>,
    pub account_type: Option<String>,
}

impl ClientInfo {
    /// Sentinel used when a lookup fails or finds nothing
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.email.is_none() && self.name.is_none() && self.account_type.is_none()
    }

    pub fn email_or_unknown(&self) -> &str {
        self.email.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn account_type_or_unknown(&self) -> &str {
        self.account_type.as_deref().unwrap_or(UNKNOWN)
    }
}

/// A client-facing transaction recorded by the BI system, the claim to corroborate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub id: String,
    pub amount: Decimal,
    pub asset: String,
    pub address: String,
    pub network: String,
    pub sub_account_id: Option<String>,
    /// Email of the exchange sub-account the transfer should leave from
    pub exchange_email: Option<String>,
    pub client: ClientInfo,
    pub created_at: Option<DateTime<Utc>>,
}

/// Exchange sub-account as listed by the broker endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAccount {
    pub id: String,
    pub email: Option<String>,
}
