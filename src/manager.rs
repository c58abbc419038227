use std::{collections::BTreeMap, fmt, num::NonZeroU32};

use chrono::NaiveDate;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::{
    book::{Book, Stocking},
    borrower::{Borrower, Eligibility},
    error::{LibraryError, Result},
    events::LibraryEvent,
    loan::{Loan, LoanKey, LoanView, ReturnReceipt},
    observers::{EventLogger, LibraryObserver, OverdueNotice},
    persistence::{JsonFileStore, Snapshot, SnapshotStore},
};

/// Owns the catalog, roster and ledger, and is their only mutator.
///
/// Every mutation is written to the store as a full snapshot before the
/// registered observers hear about it. A mutation whose snapshot cannot be
/// saved is undone in memory, so a failed call leaves the library as it was.
pub struct LibraryManager<S = JsonFileStore> {
    /// Books by identifier, in insertion order
    books: IndexMap<String, Book>,
    /// Borrowers by identifier, in insertion order
    borrowers: IndexMap<String, Borrower>,
    /// Open loans ordered by book, then borrower
    loans: BTreeMap<LoanKey, Loan>,
    /// Where snapshots are written
    store: S,
    /// Registered mutation observers
    observers: Vec<Box<dyn LibraryObserver>>,
}

// Manual implementation of Debug for LibraryManager
impl<S: fmt::Debug> fmt::Debug for LibraryManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryManager")
            .field("books", &self.books)
            .field("borrowers", &self.borrowers)
            .field("loans", &self.loans)
            .field("store", &self.store)
            .field("observers_count", &self.observers.len())
            .finish()
    }
}

impl<S: SnapshotStore> LibraryManager<S> {
    /// Load the library from `store` and attach the standard observers
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Persistence` if the stored state cannot be
    /// loaded or is corrupt.
    pub fn open(store: S) -> Result<Self> {
        let snapshot = store.load()?;
        snapshot.validate()?;

        let Snapshot {
            books,
            borrowers,
            loans,
        } = snapshot;
        debug!(
            books = books.len(),
            borrowers = borrowers.len(),
            loans = loans.len(),
            "library state loaded"
        );

        let mut manager = Self {
            books: books.into_iter().map(|b| (b.id().into(), b)).collect(),
            borrowers: borrowers.into_iter().map(|b| (b.id().into(), b)).collect(),
            loans: loans.into_iter().map(|l| (l.key().clone(), l)).collect(),
            store,
            observers: Vec::new(),
        };

        manager.register_observer(Box::new(EventLogger));
        manager.register_observer(Box::new(OverdueNotice));

        Ok(manager)
    }

    /// Register an observer to be notified of mutations
    pub fn register_observer(&mut self, observer: Box<dyn LibraryObserver>) {
        self.observers.push(observer);
    }

    /// The underlying snapshot store
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    // Catalog

    /// Add a new title, or more copies of a title already in the catalog.
    ///
    /// Title and author of an existing entry are kept as they are.
    ///
    /// # Errors
    ///
    /// Only fails with `LibraryError::Persistence` if the snapshot cannot be
    /// saved, in which case the catalog is left unchanged.
    pub fn add_or_restock(
        &mut self,
        book_id: &str,
        title: &str,
        author: &str,
        copies: NonZeroU32,
    ) -> Result<(Stocking, &Book)> {
        let previous = self.books.get(book_id).cloned();
        let (stocking, event) = if let Some(book) = self.books.get_mut(book_id) {
            book.restock(copies);
            let event = LibraryEvent::BookRestocked {
                book_id: book_id.to_string(),
                copies: copies.get(),
                total: book.total_copies(),
            };
            (Stocking::Restocked, event)
        } else {
            let book = Book::new(book_id, title, author, copies);
            self.books.insert(book_id.to_string(), book);
            let event = LibraryEvent::BookAdded {
                book_id: book_id.to_string(),
                copies: copies.get(),
            };
            (Stocking::Created, event)
        };

        self.commit(&event, |manager| match previous {
            Some(book) => {
                manager.books.insert(book_id.to_string(), book);
            }
            None => {
                manager.books.shift_remove(book_id);
            }
        })?;
        Ok((stocking, self.find_book(book_id)?))
    }

    /// All books in the order they entered the catalog
    pub fn books(&self) -> impl Iterator<Item = &Book> {
        self.books.values()
    }

    /// Look up a catalog entry
    #[must_use]
    pub fn book(&self, book_id: &str) -> Option<&Book> {
        self.books.get(book_id)
    }

    // Roster

    /// Register a new borrower, eligible for loans
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::DuplicateIdentifier` if the identifier is taken,
    /// or `LibraryError::Persistence` if the snapshot cannot be saved.
    pub fn register_borrower(&mut self, borrower_id: &str, name: &str) -> Result<&Borrower> {
        if self.borrowers.contains_key(borrower_id) {
            return Err(LibraryError::DuplicateIdentifier(borrower_id.to_string()));
        }

        let borrower = Borrower::new(borrower_id, name);
        self.borrowers.insert(borrower_id.to_string(), borrower);
        let event = LibraryEvent::BorrowerRegistered {
            borrower_id: borrower_id.to_string(),
        };

        self.commit(&event, |manager| {
            manager.borrowers.shift_remove(borrower_id);
        })?;
        self.find_borrower(borrower_id)
    }

    /// Block a borrower from new loans.
    ///
    /// Refused while the borrower still holds any book.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` for an unknown borrower,
    /// `LibraryError::HasOpenLoans` if books are still out, or
    /// `LibraryError::Persistence` if the snapshot cannot be saved.
    pub fn suspend_borrower(&mut self, borrower_id: &str) -> Result<()> {
        if !self.borrowers.contains_key(borrower_id) {
            return Err(LibraryError::borrower_not_found(borrower_id));
        }

        let open_loans = self.loans_held_by(borrower_id).count();
        if open_loans > 0 {
            return Err(LibraryError::HasOpenLoans {
                borrower_id: borrower_id.to_string(),
                open_loans,
            });
        }

        let event = LibraryEvent::BorrowerSuspended {
            borrower_id: borrower_id.to_string(),
        };
        self.change_eligibility(borrower_id, Eligibility::Suspended, &event)
    }

    /// Allow a borrower to take out loans again
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` for an unknown borrower, or
    /// `LibraryError::Persistence` if the snapshot cannot be saved.
    pub fn reinstate_borrower(&mut self, borrower_id: &str) -> Result<()> {
        let event = LibraryEvent::BorrowerReinstated {
            borrower_id: borrower_id.to_string(),
        };
        self.change_eligibility(borrower_id, Eligibility::Active, &event)
    }

    /// All borrowers, suspended ones included, in registration order
    pub fn borrowers(&self) -> impl Iterator<Item = &Borrower> {
        self.borrowers.values()
    }

    /// Look up a roster entry
    #[must_use]
    pub fn borrower(&self, borrower_id: &str) -> Option<&Borrower> {
        self.borrowers.get(borrower_id)
    }

    /// Open loans held by one borrower
    pub fn loans_held_by(&self, borrower_id: &str) -> impl Iterator<Item = &Loan> {
        self.loans
            .values()
            .filter(move |loan| loan.borrower_id() == borrower_id)
    }

    // Ledger

    /// Lend one copy of a book to a borrower on `today`.
    ///
    /// The returned loan carries the due date.
    ///
    /// # Errors
    ///
    /// Checked in this order: `LibraryError::NotFound` for an unknown book or
    /// borrower, `LibraryError::BorrowerSuspended`,
    /// `LibraryError::NoCopiesAvailable`, `LibraryError::AlreadyHolding`.
    /// `LibraryError::Persistence` if the snapshot cannot be saved, in which
    /// case no loan is opened.
    pub fn issue_loan(
        &mut self,
        book_id: &str,
        borrower_id: &str,
        today: NaiveDate,
    ) -> Result<&Loan> {
        let book = self.find_book(book_id)?;
        let borrower = self.find_borrower(borrower_id)?;

        if borrower.is_suspended() {
            return Err(LibraryError::BorrowerSuspended(borrower_id.to_string()));
        }
        if book.available_copies() == 0 {
            return Err(LibraryError::NoCopiesAvailable(book_id.to_string()));
        }

        let key = LoanKey::new(book_id, borrower_id);
        if self.loans.contains_key(&key) {
            return Err(LibraryError::AlreadyHolding {
                book_id: book_id.to_string(),
                borrower_id: borrower_id.to_string(),
            });
        }

        let lent = self.books.get_mut(book_id).is_some_and(Book::lend_copy);
        if !lent {
            return Err(LibraryError::NoCopiesAvailable(book_id.to_string()));
        }

        let loan = Loan::issue(key.clone(), today);
        let event = LibraryEvent::LoanIssued {
            key: key.clone(),
            due_on: loan.due_on(),
        };
        self.loans.insert(key.clone(), loan);

        self.commit(&event, |manager| {
            manager.loans.remove(&key);
            if let Some(book) = manager.books.get_mut(book_id) {
                book.shelve_copy();
            }
        })?;
        self.loans
            .get(&key)
            .ok_or_else(|| LibraryError::no_such_loan(&key))
    }

    /// Close a loan on `today` and put the copy back on the shelf.
    ///
    /// Late returns are reported in the receipt but carry no automatic
    /// consequence.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NoSuchLoan` if the borrower does not hold the
    /// book, or `LibraryError::Persistence` if the snapshot cannot be saved.
    /// After a failed save the loan stays open, so the return can be retried
    /// and its overdue status is still reported by [`Self::open_loans`].
    pub fn return_loan(
        &mut self,
        book_id: &str,
        borrower_id: &str,
        today: NaiveDate,
    ) -> Result<ReturnReceipt> {
        let key = LoanKey::new(book_id, borrower_id);
        let loan = self
            .loans
            .remove(&key)
            .ok_or_else(|| LibraryError::no_such_loan(&key))?;

        if let Some(book) = self.books.get_mut(book_id) {
            book.shelve_copy();
        }

        let receipt = ReturnReceipt {
            status: loan.status_on(today),
            returned_on: today,
            loan,
        };
        let event = LibraryEvent::LoanReturned {
            key,
            returned_on: today,
            status: receipt.status,
        };

        self.commit(&event, |manager| {
            let loan = receipt.loan.clone();
            manager.loans.insert(loan.key().clone(), loan);
            if let Some(book) = manager.books.get_mut(book_id) {
                book.lend_copy();
            }
        })?;
        Ok(receipt)
    }

    /// Every open loan with its status as of `today`, grouped by book and then
    /// by borrower
    pub fn open_loans(&self, today: NaiveDate) -> impl Iterator<Item = LoanView<'_>> {
        self.loans.values().map(move |loan| LoanView {
            loan,
            book: self.books.get(loan.book_id()),
            borrower: self.borrowers.get(loan.borrower_id()),
            status: loan.status_on(today),
        })
    }

    /// Open loans that are past due on `today`
    pub fn overdue_loans(&self, today: NaiveDate) -> impl Iterator<Item = LoanView<'_>> {
        self.open_loans(today)
            .filter(|view| view.status.is_overdue())
    }

    // Persistence

    /// Full copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            books: self.books.values().cloned().collect(),
            borrowers: self.borrowers.values().cloned().collect(),
            loans: self.loans.values().cloned().collect(),
        }
    }

    /// Write the current state to the store
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::Persistence` if the snapshot cannot be saved.
    pub fn flush(&mut self) -> Result<()> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot)?;
        Ok(())
    }

    fn find_book(&self, book_id: &str) -> Result<&Book> {
        self.books
            .get(book_id)
            .ok_or_else(|| LibraryError::book_not_found(book_id))
    }

    fn find_borrower(&self, borrower_id: &str) -> Result<&Borrower> {
        self.borrowers
            .get(borrower_id)
            .ok_or_else(|| LibraryError::borrower_not_found(borrower_id))
    }

    /// Set a borrower's eligibility and commit, restoring it if the save fails
    fn change_eligibility(
        &mut self,
        borrower_id: &str,
        eligibility: Eligibility,
        event: &LibraryEvent,
    ) -> Result<()> {
        let borrower = self
            .borrowers
            .get_mut(borrower_id)
            .ok_or_else(|| LibraryError::borrower_not_found(borrower_id))?;
        let previous = borrower.eligibility();
        borrower.set_eligibility(eligibility);

        self.commit(event, |manager| {
            if let Some(borrower) = manager.borrowers.get_mut(borrower_id) {
                borrower.set_eligibility(previous);
            }
        })
    }

    /// Save an applied mutation, then notify observers.
    ///
    /// If the save fails, `undo` puts the previous in-memory state back and
    /// observers are not told.
    fn commit(&mut self, event: &LibraryEvent, undo: impl FnOnce(&mut Self)) -> Result<()> {
        if let Err(error) = self.flush() {
            undo(self);
            warn!(%error, "snapshot not saved, change rolled back");
            return Err(error);
        }

        for observer in &self.observers {
            observer.on_event(event);
        }
        Ok(())
    }
}

// Include tests module
#[cfg(test)]
mod tests;
