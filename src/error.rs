//! Error types for the ledger.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors that can occur during ledger operation.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Malformed or out-of-range field supplied by the caller
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness constraint violated
    #[error("{0} already exists")]
    DuplicateKey(String),

    /// Credential mismatch. Deliberately carries no detail.
    #[error("invalid credentials")]
    AuthFailed,

    /// Transaction or connection failure; nothing was committed
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Lock contention outlasted the busy timeout. Reported as `StoreUnavailable`.
    #[error("store busy: {0}")]
    Busy(String),

    /// Failed to open, read or write a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Fieldless discriminant of [`LedgerError`] for callers that branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    DuplicateKey,
    AuthFailed,
    StoreUnavailable,
    Io,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidInput(_) => ErrorKind::InvalidInput,
            LedgerError::NotFound(_) => ErrorKind::NotFound,
            LedgerError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            LedgerError::AuthFailed => ErrorKind::AuthFailed,
            LedgerError::StoreUnavailable(_) | LedgerError::Busy(_) => ErrorKind::StoreUnavailable,
            LedgerError::Io(_) | LedgerError::Csv(_) => ErrorKind::Io,
        }
    }

    /// Only store failures may succeed when the caller tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_) | LedgerError::Busy(_))
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        LedgerError::NotFound(what.into())
    }

    /// Names the entity in a `NotFound` or `DuplicateKey` raised by the store.
    pub(crate) fn entity(self, what: impl Into<String>) -> Self {
        match self {
            LedgerError::NotFound(_) => LedgerError::NotFound(what.into()),
            LedgerError::DuplicateKey(_) => LedgerError::DuplicateKey(what.into()),
            e => e,
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::NotFound("record".to_string()),
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation
                    && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                LedgerError::DuplicateKey("record".to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                LedgerError::Busy(e.to_string())
            }
            _ => LedgerError::StoreUnavailable(e.to_string()),
        }
    }
}
