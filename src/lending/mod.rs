//! Loan lifecycle: the borrow/return state machine and rating aggregation.
//!
//! A loan has exactly two states, Active and Returned, and one legal
//! transition between them. Both operations are read-then-write sequences
//! over shared rows (loans and the book's aggregate rating), so the engine in
//! [`engine`] is written against a transaction-scoped store contract and is
//! only ever executed inside a backend's atomic scope. See
//! [`engine::LendingTxn`] for the contract.

pub mod engine;
pub mod rating;

pub use engine::{borrow, return_book, LendingTxn};

use crate::db::repository::RepositoryError;
use crate::models::{BookId, LoanId, UserId};

/// Result type for lending operations.
pub type LendingResult<T> = Result<T, LendingError>;

/// Error taxonomy for the loan lifecycle.
///
/// Three families, mapped directly to transport signaling by the HTTP layer:
/// missing entities (`*NotFound`), illegal state-machine transitions
/// (`AlreadyBorrowed*`, `AlreadyReturned`), and storage failures
/// (`Persistence`, surfaced only after the enclosing transaction has rolled
/// back). No error carries cross-operation state.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Book {0} not found")]
    BookNotFound(BookId),

    #[error("Active loan not found for user {user_id} and book {book_id}")]
    ActiveLoanNotFound { user_id: UserId, book_id: BookId },

    #[error("Book {book_id} is already borrowed by this user")]
    AlreadyBorrowedBySameUser { user_id: UserId, book_id: BookId },

    #[error("Book {book_id} is already borrowed by another user")]
    AlreadyBorrowedByOther { book_id: BookId },

    #[error("Loan {0} has already been returned")]
    AlreadyReturned(LoanId),

    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

impl LendingError {
    /// Whether this error names a missing entity (client-facing 404).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UserNotFound(_) | Self::BookNotFound(_) | Self::ActiveLoanNotFound { .. }
        )
    }

    /// Whether this error is an illegal state transition (client-facing
    /// conflict).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyBorrowedBySameUser { .. }
                | Self::AlreadyBorrowedByOther { .. }
                | Self::AlreadyReturned(_)
        )
    }

    /// Stable machine-readable code for transport payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::BookNotFound(_) => "BOOK_NOT_FOUND",
            Self::ActiveLoanNotFound { .. } => "ACTIVE_LOAN_NOT_FOUND",
            Self::AlreadyBorrowedBySameUser { .. } => "ALREADY_BORROWED_BY_SAME_USER",
            Self::AlreadyBorrowedByOther { .. } => "ALREADY_BORROWED_BY_OTHER",
            Self::AlreadyReturned(_) => "ALREADY_RETURNED",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for LendingError {
    fn from(err: diesel::result::Error) -> Self {
        LendingError::Persistence(RepositoryError::from(err))
    }
}
