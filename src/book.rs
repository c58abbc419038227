use std::{fmt, num::NonZeroU32};

/// A title held by the library, with its copy counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    /// Unique catalog identifier (an ISBN in practice)
    id: String,
    /// Title as first entered
    title: String,
    /// Author as first entered
    author: String,
    /// Copies owned by the library
    total_copies: u32,
    /// Copies currently on the shelf
    available_copies: u32,
}

impl Book {
    /// Create a catalog entry whose copies are all on the shelf
    #[must_use]
    pub fn new(id: &str, title: &str, author: &str, copies: NonZeroU32) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            author: author.to_string(),
            total_copies: copies.get(),
            available_copies: copies.get(),
        }
    }

    /// Rebuild a book from stored counts.
    ///
    /// Returns `None` when `available_copies` exceeds `total_copies`.
    #[must_use]
    pub fn from_parts(
        id: String,
        title: String,
        author: String,
        total_copies: u32,
        available_copies: u32,
    ) -> Option<Self> {
        (available_copies <= total_copies).then_some(Self {
            id,
            title,
            author,
            total_copies,
            available_copies,
        })
    }

    /// Catalog identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Title as first entered
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Author as first entered
    #[must_use]
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Copies owned by the library
    #[must_use]
    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    /// Copies currently on the shelf
    #[must_use]
    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    /// Number of copies currently out on loan
    #[must_use]
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// Add freshly acquired copies, all of which go straight to the shelf
    pub(crate) fn restock(&mut self, copies: NonZeroU32) {
        self.total_copies = self.total_copies.saturating_add(copies.get());
        self.available_copies = self.available_copies.saturating_add(copies.get());
    }

    /// Take one copy off the shelf. Returns `false` if none is available.
    pub(crate) fn lend_copy(&mut self) -> bool {
        match self.available_copies.checked_sub(1) {
            Some(remaining) => {
                self.available_copies = remaining;
                true
            }
            None => false,
        }
    }

    /// Put one copy back on the shelf, never exceeding the total
    pub(crate) fn shelve_copy(&mut self) {
        if self.available_copies < self.total_copies {
            self.available_copies = self.available_copies.saturating_add(1);
        }
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} by {} [{}] {}/{} available",
            self.title, self.author, self.id, self.available_copies, self.total_copies
        )
    }
}

/// Outcome of adding copies to the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stocking {
    /// A new catalog entry was created
    Created,
    /// Copies were added to an existing entry
    Restocked,
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::Book;

    fn copies(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
    }

    #[test]
    fn test_lend_and_shelve_keep_counts_in_range() {
        let mut book = Book::new("978-0", "Dune", "Frank Herbert", copies(1));
        assert!(book.lend_copy());
        assert_eq!(book.available_copies(), 0);
        assert!(!book.lend_copy());
        assert_eq!(book.available_copies(), 0);

        book.shelve_copy();
        book.shelve_copy();
        assert_eq!(book.available_copies(), 1);
        assert_eq!(book.total_copies(), 1);
    }

    #[test]
    fn test_restock_raises_both_counts() {
        let mut book = Book::new("978-0", "Dune", "Frank Herbert", copies(2));
        assert!(book.lend_copy());
        book.restock(copies(3));
        assert_eq!(book.total_copies(), 5);
        assert_eq!(book.available_copies(), 4);
        assert_eq!(book.copies_on_loan(), 1);
    }

    #[test]
    fn test_from_parts_rejects_more_available_than_owned() {
        let book = Book::from_parts("x".into(), "t".into(), "a".into(), 1, 2);
        assert!(book.is_none());
    }
}
