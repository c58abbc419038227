//! Snapshot storage for the catalog, roster and ledger.
//!
//! The on-disk shape is owned by the `*Record` types below. Entities never
//! derive serde traits; every conversion is written out field by field.

use std::{
    collections::{HashMap, HashSet},
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    book::Book,
    borrower::{Borrower, Eligibility},
    error::StoreError,
    loan::{LOAN_PERIOD_DAYS, Loan, LoanKey},
};

/// Format version written at the head of every snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Date format used in stored records
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Complete library state, as handed to and from a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Catalog in insertion order
    pub books: Vec<Book>,
    /// Roster in insertion order
    pub borrowers: Vec<Borrower>,
    /// Open loans in ledger order
    pub loans: Vec<Loan>,
}

impl Snapshot {
    /// Check the invariants a loaded snapshot must satisfy before use.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Corrupt` on duplicate identifiers, duplicate loans,
    /// loans that reference unknown books or borrowers, due dates that are not
    /// one loan period after issue, or books whose copies on loan do not match
    /// their open loans.
    pub fn validate(&self) -> Result<(), StoreError> {
        let mut book_ids = HashSet::new();
        for book in &self.books {
            if !book_ids.insert(book.id()) {
                return Err(StoreError::Corrupt(format!("duplicate book {}", book.id())));
            }
        }

        let mut borrower_ids = HashSet::new();
        for borrower in &self.borrowers {
            if !borrower_ids.insert(borrower.id()) {
                return Err(StoreError::Corrupt(format!("duplicate borrower {}", borrower.id())));
            }
        }

        let period = Days::new(LOAN_PERIOD_DAYS);
        let mut loan_keys = HashSet::new();
        let mut loans_per_book: HashMap<&str, u32> = HashMap::new();
        for loan in &self.loans {
            if !book_ids.contains(loan.book_id()) {
                return Err(StoreError::Corrupt(format!(
                    "loan {} references unknown book",
                    loan.key()
                )));
            }
            if !borrower_ids.contains(loan.borrower_id()) {
                return Err(StoreError::Corrupt(format!(
                    "loan {} references unknown borrower",
                    loan.key()
                )));
            }
            if !loan_keys.insert(loan.key()) {
                return Err(StoreError::Corrupt(format!("duplicate loan {}", loan.key())));
            }

            let expected_due = loan.issued_on().checked_add_days(period);
            if expected_due != Some(loan.due_on()) {
                return Err(StoreError::Corrupt(format!(
                    "loan {} is due {} but was issued {}",
                    loan.key(),
                    loan.due_on(),
                    loan.issued_on()
                )));
            }

            let count = loans_per_book.entry(loan.book_id()).or_default();
            *count = count.saturating_add(1);
        }

        for book in &self.books {
            let open = loans_per_book.get(book.id()).copied().unwrap_or(0);
            if open != book.copies_on_loan() {
                return Err(StoreError::Corrupt(format!(
                    "book {} has {} copies out but {open} open loans",
                    book.id(),
                    book.copies_on_loan()
                )));
            }
        }

        Ok(())
    }
}

/// Stored form of a book
#[derive(Debug, Clone, Deserialize, Serialize)]
struct BookRecord {
    /// Catalog identifier
    isbn: String,
    /// Title
    title: String,
    /// Author
    author: String,
    /// Copies owned
    total_copies: u32,
    /// Copies on the shelf
    available_copies: u32,
}

impl From<&Book> for BookRecord {
    fn from(book: &Book) -> Self {
        Self {
            isbn: book.id().to_string(),
            title: book.title().to_string(),
            author: book.author().to_string(),
            total_copies: book.total_copies(),
            available_copies: book.available_copies(),
        }
    }
}

impl TryFrom<BookRecord> for Book {
    type Error = StoreError;

    fn try_from(record: BookRecord) -> Result<Self, Self::Error> {
        let isbn = record.isbn.clone();
        Self::from_parts(
            record.isbn,
            record.title,
            record.author,
            record.total_copies,
            record.available_copies,
        )
        .ok_or_else(|| {
            StoreError::Corrupt(format!("book {isbn} has more copies available than owned"))
        })
    }
}

/// Stored form of a borrower
#[derive(Debug, Clone, Deserialize, Serialize)]
struct BorrowerRecord {
    /// Member identifier
    borrower_id: String,
    /// Full name
    name: String,
    /// `"active"` or `"suspended"`
    status: String,
}

impl From<&Borrower> for BorrowerRecord {
    fn from(borrower: &Borrower) -> Self {
        let status = match borrower.eligibility() {
            Eligibility::Active => "active",
            Eligibility::Suspended => "suspended",
        };
        Self {
            borrower_id: borrower.id().to_string(),
            name: borrower.name().to_string(),
            status: status.to_string(),
        }
    }
}

impl TryFrom<BorrowerRecord> for Borrower {
    type Error = StoreError;

    fn try_from(record: BorrowerRecord) -> Result<Self, Self::Error> {
        let eligibility = match record.status.as_str() {
            "active" => Eligibility::Active,
            "suspended" => Eligibility::Suspended,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "borrower {} has unknown status {other:?}",
                    record.borrower_id
                )));
            }
        };
        Ok(Self::from_parts(record.borrower_id, record.name, eligibility))
    }
}

/// Stored form of an open loan
#[derive(Debug, Clone, Deserialize, Serialize)]
struct LoanRecord {
    /// Catalog identifier of the lent book
    isbn: String,
    /// Holding borrower
    borrower_id: String,
    /// Issue date, `YYYY-MM-DD`
    issued_on: String,
    /// Due date, `YYYY-MM-DD`
    due_on: String,
}

impl From<&Loan> for LoanRecord {
    fn from(loan: &Loan) -> Self {
        Self {
            isbn: loan.book_id().to_string(),
            borrower_id: loan.borrower_id().to_string(),
            issued_on: loan.issued_on().format(DATE_FORMAT).to_string(),
            due_on: loan.due_on().format(DATE_FORMAT).to_string(),
        }
    }
}

impl TryFrom<LoanRecord> for Loan {
    type Error = StoreError;

    fn try_from(record: LoanRecord) -> Result<Self, Self::Error> {
        let issued_on = parse_date(&record.issued_on)?;
        let due_on = parse_date(&record.due_on)?;
        let key = LoanKey {
            book_id: record.isbn,
            borrower_id: record.borrower_id,
        };
        Ok(Self::from_parts(key, issued_on, due_on))
    }
}

/// Parse a stored calendar date
fn parse_date(value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StoreError::Corrupt(format!("invalid date {value:?}: {e}")))
}

/// Serializable representation of the whole library
#[derive(Debug, Deserialize, Serialize)]
struct SnapshotDocument {
    /// Format version
    version: u32,
    /// Catalog records
    books: Vec<BookRecord>,
    /// Roster records
    borrowers: Vec<BorrowerRecord>,
    /// Ledger records
    loans: Vec<LoanRecord>,
}

impl From<&Snapshot> for SnapshotDocument {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            books: snapshot.books.iter().map(Into::into).collect(),
            borrowers: snapshot.borrowers.iter().map(Into::into).collect(),
            loans: snapshot.loans.iter().map(Into::into).collect(),
        }
    }
}

impl TryFrom<SnapshotDocument> for Snapshot {
    type Error = StoreError;

    fn try_from(document: SnapshotDocument) -> Result<Self, Self::Error> {
        if document.version != SNAPSHOT_VERSION {
            let version = document.version;
            return Err(StoreError::Corrupt(format!("unsupported snapshot version {version}")));
        }

        let books = document.books.into_iter().map(Book::try_from);
        let borrowers = document.borrowers.into_iter().map(Borrower::try_from);
        let loans = document.loans.into_iter().map(Loan::try_from);
        let snapshot = Self {
            books: books.collect::<Result<_, _>>()?,
            borrowers: borrowers.collect::<Result<_, _>>()?,
            loans: loans.collect::<Result<_, _>>()?,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Encode a snapshot as pretty-printed JSON
///
/// # Errors
///
/// Returns `StoreError::Encoding` if serialization fails.
pub fn encode(snapshot: &Snapshot) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(&SnapshotDocument::from(snapshot))?)
}

/// Decode and validate a JSON snapshot
///
/// # Errors
///
/// Returns `StoreError::Encoding` for malformed JSON and `StoreError::Corrupt`
/// for a document that violates a ledger invariant.
pub fn decode(contents: &str) -> Result<Snapshot, StoreError> {
    let document: SnapshotDocument = serde_json::from_str(contents)?;
    Snapshot::try_from(document)
}

/// Durable home of the library state
pub trait SnapshotStore {
    /// Load the last saved state, or an empty snapshot if nothing was saved yet
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if stored state exists but cannot be read.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replace the stored state with `snapshot`
    ///
    /// # Errors
    ///
    /// Returns a `StoreError` if the state cannot be written.
    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

/// Stores the snapshot as one JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    /// Location of the snapshot file
    path: PathBuf,
}

impl JsonFileStore {
    /// Store writing to the snapshot file at `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the snapshot file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file written before being renamed over the snapshot
    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        debug!(path = %self.path.display(), "loading snapshot");

        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot yet, starting empty");
            return Ok(Snapshot::default());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        decode(&contents)
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let serialized = encode(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let staging = self.staging_path();
        debug!(path = %self.path.display(), "saving snapshot");

        let io_error = |e| StoreError::io(&staging, e);
        let mut file = fs::File::create(&staging).map_err(io_error)?;
        file.write_all(serialized.as_bytes()).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        drop(file);

        fs::rename(&staging, &self.path)
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

/// Keeps the snapshot in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Last saved snapshot
    saved: Option<Snapshot>,
    /// Number of successful saves
    saves: usize,
    /// When set, every save fails
    fail_saves: bool,
}

impl MemoryStore {
    /// Empty store that accepts every save
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            saved: Some(snapshot),
            ..Self::default()
        }
    }

    /// A store whose saves always fail, for exercising error paths
    #[must_use]
    pub fn failing() -> Self {
        Self::new().into_failing()
    }

    /// Keep the stored snapshot but make every later save fail
    #[must_use]
    pub fn into_failing(self) -> Self {
        Self {
            fail_saves: true,
            ..self
        }
    }

    /// The last saved snapshot, if any
    #[must_use]
    pub fn saved(&self) -> Option<&Snapshot> {
        self.saved.as_ref()
    }

    /// Number of successful saves so far
    #[must_use]
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.saved.clone().unwrap_or_default())
    }

    fn save(&mut self, snapshot: &Snapshot) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::io(
                "<memory>",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "store is read-only"),
            ));
        }
        self.saved = Some(snapshot.clone());
        self.saves = self.saves.saturating_add(1);
        Ok(())
    }
}
