//! Loan repository trait: queries plus the atomic lending operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::lending::LendingResult;
use crate::models::{BookId, Loan, Score, UserId};

/// Repository trait for loan database operations.
///
/// `borrow_book` and `return_book` are the two state-machine operations. Each
/// implementation runs the shared engine
/// ([`crate::lending::engine`]) inside its own atomic scope, so the
/// guarantees hold regardless of backend:
///
/// - for a given book, no two concurrent borrows both succeed;
/// - a return's loan update, rating recompute, and book update are visible
///   all-or-nothing.
#[async_trait]
pub trait LoanRepository: Send + Sync {
    /// Find the active loan on a book, optionally restricted to one user.
    ///
    /// At most one active loan exists per book, so this returns at most one
    /// row.
    async fn find_active_loan(
        &self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>>;

    /// All returned loans for a book, scores included.
    async fn find_returned_loans(&self, book_id: BookId) -> RepositoryResult<Vec<Loan>>;

    /// All loans (active and returned) held by a user.
    async fn loans_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Loan>>;

    /// Create a new active loan for a (user, book) pair.
    ///
    /// Fails with `AlreadyBorrowedBySameUser` or `AlreadyBorrowedByOther`
    /// when the book is already out. Both identifiers must reference existing
    /// rows; the service layer resolves them first.
    async fn borrow_book(&self, user_id: UserId, book_id: BookId) -> LendingResult<Loan>;

    /// Close the active loan for a (user, book) pair, recording `score` and
    /// recomputing the book's aggregate rating in the same transaction.
    ///
    /// Fails with `ActiveLoanNotFound` when the pair has no active loan. On
    /// any persistence failure every write of the operation is rolled back
    /// before the error surfaces.
    async fn return_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        score: Score,
    ) -> LendingResult<Loan>;
}
