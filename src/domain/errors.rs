//! Error types shared by the reconciliation domain and its adapters.
//!
//! Each external collaborator gets its own enum so the engine can decide,
//! per failure class, whether to abstain, degrade or abort.

use thiserror::Error;

/// Failures talking to the exchange ledger API.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// Connection error or timeout on a single attempt
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport kept failing until the retry policy gave up
    #[error("Gave up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    /// Exchange answered with a non-success status
    #[error("Exchange returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded into ledger records
    #[error("Failed to decode exchange response: {0}")]
    Decode(String),

    /// Request could not be signed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Pagination never produced a short page
    #[error("Pagination exceeded {max_pages} pages")]
    PageLimitExceeded { max_pages: u32 },
}

impl LedgerError {
    /// Whether another attempt of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Transport(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures talking to the business-intelligence system.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("BI transport error: {0}")]
    Transport(String),

    #[error("BI returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode BI response: {0}")]
    Decode(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Failures of the durable dedup store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Dedup store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failures delivering an alert.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NotifyError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors that stop a reconciliation flow.
///
/// Fetch failures are not in here: they degrade the run report instead.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid flow configuration: {0}")]
    Configuration(String),
}
