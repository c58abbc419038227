//! Book catalog, borrower roster and loan ledger for a single-operator library.
//!
//! [`LibraryManager`] owns all state and is the only thing that mutates it.
//! Loans run for a fixed [`LOAN_PERIOD_DAYS`]; overdue status is reported but
//! never acted on automatically. State is written to a [`SnapshotStore`] after
//! every change.

pub mod book;
pub mod borrower;
pub mod config;
pub mod error;
pub mod events;
pub mod loan;
pub mod manager;
pub mod observers;
pub mod persistence;

pub use book::{Book, Stocking};
pub use borrower::{Borrower, Eligibility};
pub use config::LibraryConfig;
pub use error::{ConfigError, EntityKind, LibraryError, Result, StoreError};
pub use events::LibraryEvent;
pub use loan::{LOAN_PERIOD_DAYS, Loan, LoanKey, LoanStatus, LoanView, ReturnReceipt};
pub use manager::LibraryManager;
pub use persistence::{JsonFileStore, MemoryStore, Snapshot, SnapshotStore};
