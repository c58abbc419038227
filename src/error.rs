//! Error types for ledger operations and snapshot storage

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::loan::LoanKey;

/// Result alias for ledger operations
pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

/// Which kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Catalog entry
    Book,
    /// Roster entry
    Borrower,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Borrower => write!(f, "borrower"),
        }
    }
}

/// Errors returned by library operations
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Unknown book or borrower identifier
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// Registration collided with an existing borrower
    #[error("borrower already registered: {0}")]
    DuplicateIdentifier(String),

    /// Suspension refused while the borrower still holds books
    #[error("borrower {borrower_id} still holds {open_loans} book(s)")]
    HasOpenLoans {
        borrower_id: String,
        open_loans: usize,
    },

    /// Suspended borrowers cannot take out loans
    #[error("borrower {0} is suspended")]
    BorrowerSuspended(String),

    /// Every copy of the book is out
    #[error("no copies of {0} are available")]
    NoCopiesAvailable(String),

    /// The borrower already holds a copy of this book
    #[error("borrower {borrower_id} already holds a copy of {book_id}")]
    AlreadyHolding {
        book_id: String,
        borrower_id: String,
    },

    /// No open loan for this book and borrower
    #[error("no loan of {book_id} to {borrower_id}")]
    NoSuchLoan {
        book_id: String,
        borrower_id: String,
    },

    /// Saving or loading state failed
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The configuration could not be read
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LibraryError {
    /// True for storage and configuration failures, false for refused
    /// business operations
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Config(_))
    }

    pub(crate) fn book_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Book,
            id: id.to_string(),
        }
    }

    pub(crate) fn borrower_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: EntityKind::Borrower,
            id: id.to_string(),
        }
    }

    pub(crate) fn no_such_loan(key: &LoanKey) -> Self {
        Self::NoSuchLoan {
            book_id: key.book_id.clone(),
            borrower_id: key.borrower_id.clone(),
        }
    }
}

/// Errors raised by a snapshot store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The snapshot could not be encoded or decoded
    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The snapshot decoded but violates a ledger invariant
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for this program
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
