use tracing::{info, warn};

use crate::{events::LibraryEvent, loan::LoanStatus};

/// Trait for mutation observation
pub trait LibraryObserver {
    /// Called after a mutation has been applied and saved
    fn on_event(&self, event: &LibraryEvent);
}

/// Logs every mutation that occurs in the library
#[derive(Debug)]
pub struct EventLogger;

impl LibraryObserver for EventLogger {
    fn on_event(&self, event: &LibraryEvent) {
        match event {
            LibraryEvent::BookAdded { book_id, copies } => {
                info!(%book_id, copies, "book added");
            }
            LibraryEvent::BookRestocked {
                book_id,
                copies,
                total,
            } => {
                info!(%book_id, copies, total, "book restocked");
            }
            LibraryEvent::BorrowerRegistered { borrower_id } => {
                info!(%borrower_id, "borrower registered");
            }
            LibraryEvent::BorrowerSuspended { borrower_id } => {
                info!(%borrower_id, "borrower suspended");
            }
            LibraryEvent::BorrowerReinstated { borrower_id } => {
                info!(%borrower_id, "borrower reinstated");
            }
            LibraryEvent::LoanIssued { key, due_on } => {
                info!(
                    book_id = %key.book_id,
                    borrower_id = %key.borrower_id,
                    %due_on,
                    "loan issued"
                );
            }
            LibraryEvent::LoanReturned {
                key,
                returned_on,
                status,
            } => {
                info!(
                    book_id = %key.book_id,
                    borrower_id = %key.borrower_id,
                    %returned_on,
                    %status,
                    "loan returned"
                );
            }
        }
    }
}

/// Warns the operator about late returns.
///
/// Only advises; suspension stays a manual decision.
#[derive(Debug)]
pub struct OverdueNotice;

impl LibraryObserver for OverdueNotice {
    fn on_event(&self, event: &LibraryEvent) {
        if let LibraryEvent::LoanReturned {
            key,
            status: LoanStatus::Overdue { days },
            ..
        } = event
        {
            warn!(
                book_id = %key.book_id,
                borrower_id = %key.borrower_id,
                days_overdue = days,
                "late return; consider suspending the borrower until resolved"
            );
        }
    }
}
