use chrono::NaiveDate;

use crate::loan::{LoanKey, LoanStatus};

/// Mutations applied by the library manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    /// A title entered the catalog
    BookAdded { book_id: String, copies: u32 },
    /// Copies were added to an existing title
    BookRestocked {
        book_id: String,
        copies: u32,
        total: u32,
    },
    /// A borrower joined the roster
    BorrowerRegistered { borrower_id: String },
    /// A borrower was blocked from new loans
    BorrowerSuspended { borrower_id: String },
    /// A borrower was allowed to borrow again
    BorrowerReinstated { borrower_id: String },
    /// A copy left the shelf
    LoanIssued { key: LoanKey, due_on: NaiveDate },
    /// A copy came back
    LoanReturned {
        key: LoanKey,
        returned_on: NaiveDate,
        status: LoanStatus,
    },
}
