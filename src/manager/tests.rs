#[cfg(test)]
use std::{cell::RefCell, num::NonZeroU32, rc::Rc};

use chrono::{Days, NaiveDate};
use proptest::prelude::*;

use crate::{
    book::{Book, Stocking},
    borrower::{Borrower, Eligibility},
    config::LibraryConfig,
    error::{EntityKind, LibraryError},
    events::LibraryEvent,
    loan::{Loan, LoanStatus},
    manager::LibraryManager,
    observers::LibraryObserver,
    persistence::{MemoryStore, SnapshotStore},
};

/// Calendar day `n` of the test timeline
fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1)
        .and_then(|d| d.checked_add_days(Days::new(n)))
        .unwrap_or_default()
}

/// Copy count helper
fn copies(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

/// Open a manager over `store`, failing the test if the snapshot is refused
#[allow(clippy::expect_used)]
fn open(store: MemoryStore) -> LibraryManager<MemoryStore> {
    LibraryManager::open(store).expect("store should open")
}

/// Add copies of a title, failing the test if the library refuses
#[allow(clippy::expect_used)]
fn stock(library: &mut LibraryManager<MemoryStore>, book_id: &str, title: &str, n: u32) {
    library
        .add_or_restock(book_id, title, "Anon", copies(n))
        .expect("book should be stocked");
}

/// Register a borrower, failing the test if the library refuses
#[allow(clippy::expect_used)]
fn enrol(library: &mut LibraryManager<MemoryStore>, borrower_id: &str, name: &str) {
    library
        .register_borrower(borrower_id, name)
        .expect("borrower should register");
}

/// Copies of `book_id` on the shelf
fn available<S: SnapshotStore>(library: &LibraryManager<S>, book_id: &str) -> Option<u32> {
    library.book(book_id).map(Book::available_copies)
}

/// Eligibility of `borrower_id`
fn eligibility(library: &LibraryManager<MemoryStore>, borrower_id: &str) -> Option<Eligibility> {
    library.borrower(borrower_id).map(Borrower::eligibility)
}

/// Helper function to set up a library with book B1 (one copy) and active borrower S1
fn setup_test_library() -> LibraryManager<MemoryStore> {
    let mut library = open(MemoryStore::new());
    stock(&mut library, "B1", "Dune", 1);
    enrol(&mut library, "S1", "Ana Souza");
    library
}

/// Records every event it sees
#[derive(Debug, Default, Clone)]
struct Recorder(Rc<RefCell<Vec<LibraryEvent>>>);

impl LibraryObserver for Recorder {
    fn on_event(&self, event: &LibraryEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

#[test]
fn test_issue_sets_due_date_and_takes_copy() {
    let mut library = setup_test_library();

    let due = library.issue_loan("B1", "S1", day(0)).map(Loan::due_on);
    assert_eq!(due.ok(), Some(day(7)));
    assert_eq!(available(&library, "B1"), Some(0));
}

#[test]
fn test_second_issue_of_same_pair_is_already_holding() {
    let mut library = setup_test_library();
    stock(&mut library, "B1", "Dune", 1);

    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());
    let second = library.issue_loan("B1", "S1", day(1));
    assert!(matches!(second, Err(LibraryError::AlreadyHolding { .. })));
    assert_eq!(available(&library, "B1"), Some(1));
}

#[test]
fn test_issue_without_copies_is_refused_before_holding_check() {
    let mut library = setup_test_library();

    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());
    let second = library.issue_loan("B1", "S1", day(1));
    assert!(matches!(second, Err(LibraryError::NoCopiesAvailable(ref id)) if id == "B1"));
}

#[test]
fn test_suspend_blocked_until_return() {
    let mut library = setup_test_library();
    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());

    let refused = library.suspend_borrower("S1");
    assert!(matches!(refused, Err(LibraryError::HasOpenLoans { open_loans: 1, .. })));
    assert_eq!(eligibility(&library, "S1"), Some(Eligibility::Active));

    let receipt = library.return_loan("B1", "S1", day(3));
    assert!(receipt.is_ok_and(|r| r.status == LoanStatus::OnTime && !r.recommends_suspension()));

    assert!(library.suspend_borrower("S1").is_ok());
    assert_eq!(eligibility(&library, "S1"), Some(Eligibility::Suspended));
}

#[test]
fn test_late_return_reports_days_overdue() {
    let mut library = setup_test_library();
    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());

    let receipt = library.return_loan("B1", "S1", day(10));
    assert!(matches!(receipt, Ok(ref r) if r.status == LoanStatus::Overdue { days: 3 }));
    assert!(receipt.is_ok_and(|r| r.recommends_suspension() && r.returned_on == day(10)));

    // Advisory only: the borrower stays active
    assert_eq!(eligibility(&library, "S1"), Some(Eligibility::Active));
    assert_eq!(available(&library, "B1"), Some(1));
}

#[test]
fn test_unknown_book_then_restocked() {
    let mut library = setup_test_library();

    let missing = library.issue_loan("B2", "S1", day(0));
    assert!(matches!(missing, Err(LibraryError::NotFound { kind: EntityKind::Book, .. })));

    let added = library
        .add_or_restock("B2", "Emma", "Jane Austen", copies(1))
        .map(|(s, b)| (s, b.available_copies()));
    assert!(matches!(added, Ok((Stocking::Created, 1))));
    assert!(library.issue_loan("B2", "S1", day(0)).is_ok());
}

#[test]
fn test_issue_checks_book_before_borrower() {
    let mut library = setup_test_library();

    let result = library.issue_loan("nope", "nobody", day(0));
    assert!(matches!(result, Err(LibraryError::NotFound { kind: EntityKind::Book, .. })));

    let result = library.issue_loan("B1", "nobody", day(0));
    assert!(matches!(result, Err(LibraryError::NotFound { kind: EntityKind::Borrower, .. })));
}

#[test]
fn test_suspended_borrower_refused_before_availability() {
    let mut library = setup_test_library();
    enrol(&mut library, "S2", "Rui Lima");
    assert!(library.issue_loan("B1", "S2", day(0)).is_ok());
    assert!(library.suspend_borrower("S1").is_ok());

    // B1 has no copies left, but suspension is reported first
    let result = library.issue_loan("B1", "S1", day(1));
    assert!(matches!(result, Err(LibraryError::BorrowerSuspended(ref id)) if id == "S1"));

    assert!(library.reinstate_borrower("S1").is_ok());
    let result = library.issue_loan("B1", "S1", day(1));
    assert!(matches!(result, Err(LibraryError::NoCopiesAvailable(_))));
}

#[test]
fn test_restock_keeps_original_title() {
    let mut library = setup_test_library();

    let restocked = library.add_or_restock("B1", "Dune (2nd ed.)", "F. Herbert", copies(2));
    assert!(matches!(restocked, Ok((Stocking::Restocked, _))));

    let book = library.book("B1");
    assert_eq!(book.map(Book::title), Some("Dune"));
    assert_eq!(
        book.map(|b| (b.total_copies(), b.available_copies())),
        Some((3, 3))
    );
}

#[test]
fn test_register_duplicate_and_unknown_borrowers() {
    let mut library = setup_test_library();

    assert!(matches!(
        library.register_borrower("S1", "Someone Else"),
        Err(LibraryError::DuplicateIdentifier(ref id)) if id == "S1"
    ));
    let name = library.borrower("S1").map(Borrower::name);
    assert_eq!(name, Some("Ana Souza"));

    assert!(matches!(library.suspend_borrower("S9"), Err(LibraryError::NotFound { .. })));
    assert!(matches!(library.reinstate_borrower("S9"), Err(LibraryError::NotFound { .. })));
}

#[test]
fn test_return_without_loan() {
    let mut library = setup_test_library();
    let result = library.return_loan("B1", "S1", day(0));
    assert!(matches!(result, Err(LibraryError::NoSuchLoan { .. })));
    assert_eq!(available(&library, "B1"), Some(1));
}

#[test]
fn test_listings_keep_insertion_order_and_include_suspended() {
    let mut library = setup_test_library();
    stock(&mut library, "A0", "Emma", 1);
    enrol(&mut library, "R2", "Rui Lima");
    assert!(library.suspend_borrower("R2").is_ok());

    let books: Vec<&str> = library.books().map(Book::id).collect();
    assert_eq!(books, vec!["B1", "A0"]);

    let borrowers: Vec<(&str, bool)> = library
        .borrowers()
        .map(|b| (b.id(), b.is_suspended()))
        .collect();
    assert_eq!(borrowers, vec![("S1", false), ("R2", true)]);

    // Restartable
    assert_eq!(library.books().count(), 2);
    assert_eq!(library.books().count(), 2);
}

#[test]
fn test_open_loans_grouped_by_book_then_borrower() {
    let mut library = setup_test_library();
    stock(&mut library, "A0", "Emma", 3);
    enrol(&mut library, "S0", "Bia Costa");

    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());
    assert!(library.issue_loan("A0", "S1", day(2)).is_ok());
    assert!(library.issue_loan("A0", "S0", day(5)).is_ok());

    let rows: Vec<(String, LoanStatus)> = library
        .open_loans(day(10))
        .map(|v| (v.loan.key().to_string(), v.status))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("A0 -> S0".to_string(), LoanStatus::OnTime),
            ("A0 -> S1".to_string(), LoanStatus::Overdue { days: 1 }),
            ("B1 -> S1".to_string(), LoanStatus::Overdue { days: 3 }),
        ]
    );

    let overdue = library.overdue_loans(day(10)).count();
    assert_eq!(overdue, 2);

    let titled: Vec<&str> = library
        .open_loans(day(10))
        .filter_map(|v| v.book.map(Book::title))
        .collect();
    assert_eq!(titled, vec!["Emma", "Emma", "Dune"]);

    // Listing has no side effects
    assert_eq!(library.open_loans(day(10)).count(), 3);
    assert_eq!(library.loans_held_by("S1").count(), 2);
}

#[test]
fn test_every_mutation_saves() {
    let mut library = setup_test_library();
    assert_eq!(library.store().saves(), 2);

    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());
    assert!(library.return_loan("B1", "S1", day(1)).is_ok());
    assert!(library.suspend_borrower("S1").is_ok());
    assert!(library.reinstate_borrower("S1").is_ok());
    assert_eq!(library.store().saves(), 6);

    // Refused operations do not save
    assert!(library.return_loan("B1", "S1", day(1)).is_err());
    assert_eq!(library.store().saves(), 6);

    assert!(library.flush().is_ok());
    assert_eq!(library.store().saves(), 7);
}

#[test]
#[allow(clippy::expect_used)]
fn test_saved_state_reopens_identically() {
    let mut library = setup_test_library();
    stock(&mut library, "A0", "Emma", 2);
    enrol(&mut library, "S2", "Rui Lima");
    assert!(library.suspend_borrower("S2").is_ok());
    assert!(library.issue_loan("A0", "S1", day(4)).is_ok());

    let saved = library
        .store()
        .saved()
        .cloned()
        .expect("state should have been saved");
    assert_eq!(saved, library.snapshot());

    let reopened = open(MemoryStore::with_snapshot(saved));
    assert_eq!(reopened.snapshot(), library.snapshot());
    assert!(reopened.borrower("S2").is_some_and(Borrower::is_suspended));

    let due = reopened.open_loans(day(4)).next().map(|v| v.due_on());
    assert_eq!(due, Some(day(11)));
}

#[test]
#[allow(clippy::expect_used)]
fn test_file_backed_library_survives_restart() {
    let temp_dir = tempfile::TempDir::new().expect("temp dir should be created");
    let config = LibraryConfig::new(temp_dir.path().join("state"));

    let before = {
        let mut library =
            LibraryManager::open(config.file_store()).expect("fresh store should open");
        library
            .add_or_restock("978-0441013593", "Dune", "Frank Herbert", copies(2))
            .expect("book should be added");
        library
            .register_borrower("12345", "Ana Souza")
            .expect("borrower should register");
        library
            .issue_loan("978-0441013593", "12345", day(0))
            .expect("loan should be issued");
        library.snapshot()
    };

    let reopened = LibraryManager::open(config.file_store()).expect("saved store should open");
    assert_eq!(reopened.snapshot(), before);
    assert_eq!(available(&reopened, "978-0441013593"), Some(1));
}

#[test]
#[allow(clippy::expect_used)]
fn test_save_failure_is_operational() {
    let mut library = open(MemoryStore::failing());

    let error = library
        .register_borrower("S1", "Ana Souza")
        .expect_err("save should fail");
    assert!(error.is_operational());
    assert!(matches!(error, LibraryError::Persistence(_)));

    // Rolled back, so a retry reaches the store again instead of colliding
    assert!(library.borrower("S1").is_none());
    let retry = library.register_borrower("S1", "Ana Souza");
    assert!(matches!(retry, Err(LibraryError::Persistence(_))));
    assert_eq!(library.store().saves(), 0);

    let refused = LibraryError::NoSuchLoan {
        book_id: "B1".into(),
        borrower_id: "S1".into(),
    };
    assert!(!refused.is_operational());
}

#[test]
fn test_failed_save_keeps_late_return_recoverable() {
    let mut library = setup_test_library();
    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());

    let mut library = open(MemoryStore::with_snapshot(library.snapshot()).into_failing());
    let recorder = Recorder::default();
    library.register_observer(Box::new(recorder.clone()));

    let returned = library.return_loan("B1", "S1", day(10));
    assert!(matches!(returned, Err(ref e) if e.is_operational()));

    // The loan is still open and still reports how late it is
    assert_eq!(available(&library, "B1"), Some(0));
    let status = library.overdue_loans(day(10)).next().map(|v| v.status);
    assert_eq!(status, Some(LoanStatus::Overdue { days: 3 }));

    // Retrying fails the same way instead of reporting a missing loan
    let retried = library.return_loan("B1", "S1", day(10));
    assert!(matches!(retried, Err(LibraryError::Persistence(_))));
    assert!(recorder.0.borrow().is_empty());
}

#[test]
fn test_failed_saves_leave_state_unchanged() {
    let snapshot = setup_test_library().snapshot();
    let mut library = open(MemoryStore::with_snapshot(snapshot.clone()).into_failing());

    let issued = library.issue_loan("B1", "S1", day(0));
    assert!(matches!(issued, Err(LibraryError::Persistence(_))));
    assert_eq!(available(&library, "B1"), Some(1));
    assert_eq!(library.open_loans(day(0)).count(), 0);

    let suspended = library.suspend_borrower("S1");
    assert!(matches!(suspended, Err(LibraryError::Persistence(_))));
    assert_eq!(eligibility(&library, "S1"), Some(Eligibility::Active));

    let restocked = library.add_or_restock("B1", "Dune", "Frank Herbert", copies(4));
    assert!(restocked.is_err());
    let added = library.add_or_restock("B9", "Emma", "Jane Austen", copies(1));
    assert!(added.is_err());

    assert!(library.book("B9").is_none());
    assert_eq!(library.snapshot(), snapshot);
}

#[test]
fn test_observers_see_mutations_in_order() {
    let mut library = setup_test_library();
    let recorder = Recorder::default();
    library.register_observer(Box::new(recorder.clone()));

    assert!(library.issue_loan("B1", "S1", day(0)).is_ok());
    assert!(library.return_loan("B1", "S1", day(9)).is_ok());
    assert!(library.issue_loan("B1", "S9", day(9)).is_err());

    let events = recorder.0.borrow();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        events.first(),
        Some(LibraryEvent::LoanIssued { due_on, .. }) if *due_on == day(7)
    ));
    assert!(matches!(
        events.get(1),
        Some(LibraryEvent::LoanReturned { status: LoanStatus::Overdue { days: 2 }, .. })
    ));
}

#[test]
fn test_memory_store_starts_empty() {
    let store = MemoryStore::new();
    assert!(store.load().is_ok_and(|s| s.books.is_empty() && s.loans.is_empty()));
}

/// One randomly chosen library command
#[derive(Debug, Clone)]
enum Op {
    /// Add copies of a book
    Restock(usize, u32),
    /// Issue a loan
    Issue(usize, usize, u64),
    /// Return a loan
    Return(usize, usize, u64),
    /// Suspend a borrower
    Suspend(usize),
    /// Reinstate a borrower
    Reinstate(usize),
}

/// Strategy producing random commands over a small id space
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 1..3u32).prop_map(|(b, n)| Op::Restock(b, n)),
        (0..3usize, 0..3usize, 0..30u64).prop_map(|(b, s, d)| Op::Issue(b, s, d)),
        (0..3usize, 0..3usize, 0..30u64).prop_map(|(b, s, d)| Op::Return(b, s, d)),
        (0..3usize).prop_map(Op::Suspend),
        (0..3usize).prop_map(Op::Reinstate),
    ]
}

/// Book identifiers used by the property test
const BOOK_IDS: [&str; 3] = ["B0", "B1", "B2"];
/// Borrower identifiers used by the property test
const BORROWER_IDS: [&str; 3] = ["S0", "S1", "S2"];

/// Look up a test identifier
fn pick(ids: [&'static str; 3], idx: usize) -> &'static str {
    ids.get(idx).copied().unwrap_or("missing")
}

proptest! {
    #[test]
    fn prop_counts_stay_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let mut library = open(MemoryStore::new());
        for id in BORROWER_IDS {
            enrol(&mut library, id, id);
        }

        for op in ops {
            match op {
                Op::Restock(b, n) => {
                    let id = pick(BOOK_IDS, b);
                    stock(&mut library, id, id, n);
                }
                Op::Issue(b, s, d) => {
                    let borrower_id = pick(BORROWER_IDS, s);
                    let issued = library.issue_loan(pick(BOOK_IDS, b), borrower_id, day(d));
                    if issued.is_ok() {
                        let borrower = library.borrower(borrower_id);
                        prop_assert!(borrower.is_some_and(|b| !b.is_suspended()));
                    }
                }
                Op::Return(b, s, d) => {
                    let (book_id, borrower_id) = (pick(BOOK_IDS, b), pick(BORROWER_IDS, s));
                    let held = library.loans_held_by(borrower_id).any(|l| l.book_id() == book_id);
                    let returned = library.return_loan(book_id, borrower_id, day(d));
                    prop_assert_eq!(returned.is_ok(), held);
                }
                Op::Suspend(s) => {
                    let borrower_id = pick(BORROWER_IDS, s);
                    let holds = library.loans_held_by(borrower_id).count() > 0;
                    prop_assert_eq!(library.suspend_borrower(borrower_id).is_ok(), !holds);
                }
                Op::Reinstate(s) => {
                    prop_assert!(library.reinstate_borrower(pick(BORROWER_IDS, s)).is_ok());
                }
            }

            for book in library.books() {
                prop_assert!(book.available_copies() <= book.total_copies());
                let on_loan = library
                    .open_loans(day(0))
                    .filter(|v| v.loan.book_id() == book.id())
                    .count();
                let out = usize::try_from(book.copies_on_loan()).unwrap_or(usize::MAX);
                prop_assert_eq!(out, on_loan);
            }
            for borrower in library.borrowers().filter(|b| b.is_suspended()) {
                prop_assert_eq!(library.loans_held_by(borrower.id()).count(), 0);
            }
            prop_assert!(library.snapshot().validate().is_ok());
        }
    }
}
