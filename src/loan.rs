//! Loans, due dates and overdue status.

use std::fmt;

use chrono::{Days, NaiveDate};

use crate::{book::Book, borrower::Borrower};

/// Length of every loan, in calendar days
pub const LOAN_PERIOD_DAYS: u64 = 7;

/// Identifies a loan: one borrower holding one title
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoanKey {
    /// Catalog identifier of the lent book
    pub book_id: String,
    /// Identifier of the holding borrower
    pub borrower_id: String,
}

impl LoanKey {
    #[must_use]
    pub fn new(book_id: &str, borrower_id: &str) -> Self {
        Self {
            book_id: book_id.to_string(),
            borrower_id: borrower_id.to_string(),
        }
    }
}

impl fmt::Display for LoanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.book_id, self.borrower_id)
    }
}

/// Overdue status of a loan on a given day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoanStatus {
    /// Not past the due date
    OnTime,
    /// Past the due date by the given number of whole days
    Overdue {
        /// Whole days elapsed since the due date
        days: u64,
    },
}

impl LoanStatus {
    /// Whether the loan is past its due date
    #[must_use]
    pub fn is_overdue(self) -> bool {
        matches!(self, Self::Overdue { .. })
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnTime => write!(f, "on time"),
            Self::Overdue { days } => write!(f, "OVERDUE ({days} days)"),
        }
    }
}

/// An open loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    /// Book and borrower of this loan
    key: LoanKey,
    /// Day the copy left the shelf
    issued_on: NaiveDate,
    /// Day the copy is expected back
    due_on: NaiveDate,
}

impl Loan {
    /// Open a loan on `issued_on`, due [`LOAN_PERIOD_DAYS`] later
    #[must_use]
    pub fn issue(key: LoanKey, issued_on: NaiveDate) -> Self {
        let term = Days::new(LOAN_PERIOD_DAYS);
        let due_on = issued_on.checked_add_days(term).unwrap_or(NaiveDate::MAX);
        Self::from_parts(key, issued_on, due_on)
    }

    /// Rebuild a loan from stored dates
    #[must_use]
    pub fn from_parts(key: LoanKey, issued_on: NaiveDate, due_on: NaiveDate) -> Self {
        Self {
            key,
            issued_on,
            due_on,
        }
    }

    /// Book and borrower of this loan
    #[must_use]
    pub fn key(&self) -> &LoanKey {
        &self.key
    }

    /// Catalog identifier of the lent book
    #[must_use]
    pub fn book_id(&self) -> &str {
        &self.key.book_id
    }

    /// Identifier of the holding borrower
    #[must_use]
    pub fn borrower_id(&self) -> &str {
        &self.key.borrower_id
    }

    /// Day the copy left the shelf
    #[must_use]
    pub fn issued_on(&self) -> NaiveDate {
        self.issued_on
    }

    /// Day the copy is expected back
    #[must_use]
    pub fn due_on(&self) -> NaiveDate {
        self.due_on
    }

    /// Overdue status of this loan as seen on `today`.
    ///
    /// A loan becomes overdue the day after its due date.
    #[must_use]
    pub fn status_on(&self, today: NaiveDate) -> LoanStatus {
        if today > self.due_on {
            let days = today
                .signed_duration_since(self.due_on)
                .num_days()
                .unsigned_abs();
            LoanStatus::Overdue { days }
        } else {
            LoanStatus::OnTime
        }
    }
}

/// What the ledger reports back when a copy comes home
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnReceipt {
    /// The loan that was closed
    pub loan: Loan,
    /// Day the copy was returned
    pub returned_on: NaiveDate,
    /// Status of the loan at the moment of return
    pub status: LoanStatus,
}

impl ReturnReceipt {
    /// Whether the copy came back after its due date
    #[must_use]
    pub fn is_late(&self) -> bool {
        self.status.is_overdue()
    }

    /// Late returns are flagged for the operator to consider a suspension.
    /// The ledger itself never suspends anyone.
    #[must_use]
    pub fn recommends_suspension(&self) -> bool {
        self.is_late()
    }
}

/// One row of the open-loan report
#[derive(Debug, Clone, Copy)]
pub struct LoanView<'a> {
    /// The open loan
    pub loan: &'a Loan,
    /// Catalog record of the lent book, if present
    pub book: Option<&'a Book>,
    /// Roster record of the borrower, if present
    pub borrower: Option<&'a Borrower>,
    /// Status as of the report date
    pub status: LoanStatus,
}

impl LoanView<'_> {
    /// Due date of the listed loan
    #[must_use]
    pub fn due_on(&self) -> NaiveDate {
        self.loan.due_on()
    }
}

impl fmt::Display for LoanView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.book.map_or("[unknown book]", Book::title);
        let name = self.borrower.map_or("[unknown borrower]", Borrower::name);
        write!(
            f,
            "{title} ({}) | {name} ({}) | due {} | {}",
            self.loan.book_id(),
            self.loan.borrower_id(),
            self.loan.due_on().format("%Y-%m-%d"),
            self.status
        )
    }
}
