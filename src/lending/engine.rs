//! The loan lifecycle engine.
//!
//! [`borrow`] and [`return_book`] implement the two state-machine operations
//! against [`LendingTxn`], the transaction-scoped store contract. The engine
//! never opens or commits a transaction itself: each repository backend
//! constructs a `LendingTxn` inside its own atomic scope (a Diesel
//! transaction holding a row lock on the book, or the in-memory store's write
//! lock) and runs the engine there. That keeps the check-then-act sequences
//! exclusive per book and makes every write visible all-or-nothing.

use chrono::{DateTime, Utc};

use super::rating;
use super::{LendingError, LendingResult};
use crate::db::repository::RepositoryResult;
use crate::models::{Book, BookId, Loan, Score, UserId};

/// Store contract for one lending transaction.
///
/// One instance covers exactly one borrow or return; every call sees and
/// mutates the same isolated snapshot, and the backend commits or rolls back
/// the lot when the engine returns.
pub trait LendingTxn {
    /// Find the active loan on a book, optionally restricted to one user.
    ///
    /// At most one such loan can exist per book (that is the invariant the
    /// engine maintains), so this returns at most one row.
    fn find_active_loan(
        &mut self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>>;

    /// Insert a new active loan and return the persisted row.
    fn insert_loan(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        borrowed_at: DateTime<Utc>,
    ) -> RepositoryResult<Loan>;

    /// Persist an updated loan row.
    fn update_loan(&mut self, loan: &Loan) -> RepositoryResult<()>;

    /// Fetch a book row.
    fn find_book(&mut self, book_id: BookId) -> RepositoryResult<Book>;

    /// Persist an updated book row.
    fn update_book(&mut self, book: &Book) -> RepositoryResult<()>;

    /// Scores of all returned loans for a book.
    fn returned_scores(&mut self, book_id: BookId) -> RepositoryResult<Vec<Score>>;
}

/// Create a new active loan for a (user, book) pair.
///
/// The caller has already resolved both entities; this enforces the lending
/// rules:
///
/// 1. The same user must not already hold an active loan on the book.
/// 2. No other user may hold an active loan on the book.
///
/// The two checks report distinct errors on purpose — the first gives the
/// caller a more precise message than a generic "already borrowed".
pub fn borrow(
    txn: &mut dyn LendingTxn,
    user_id: UserId,
    book_id: BookId,
    now: DateTime<Utc>,
) -> LendingResult<Loan> {
    if txn.find_active_loan(book_id, Some(user_id))?.is_some() {
        return Err(LendingError::AlreadyBorrowedBySameUser { user_id, book_id });
    }

    if txn.find_active_loan(book_id, None)?.is_some() {
        return Err(LendingError::AlreadyBorrowedByOther { book_id });
    }

    let loan = txn.insert_loan(user_id, book_id, now)?;
    Ok(loan)
}

/// Close the active loan for a (user, book) pair and record its score.
///
/// Marks the loan returned, then recomputes the book's aggregate rating from
/// all returned loans (including this one) and writes the book row. Both
/// writes land in the same transaction as the loan lookup: either the loan
/// flips to returned *and* the aggregate reflects it, or neither happened.
pub fn return_book(
    txn: &mut dyn LendingTxn,
    user_id: UserId,
    book_id: BookId,
    score: Score,
    now: DateTime<Utc>,
) -> LendingResult<Loan> {
    let mut loan = txn
        .find_active_loan(book_id, Some(user_id))?
        .ok_or(LendingError::ActiveLoanNotFound { user_id, book_id })?;

    // find_active_loan filters on returned_at already; re-check in case a
    // backend hands back a stale row.
    if loan.returned_at.is_some() {
        return Err(LendingError::AlreadyReturned(loan.id));
    }

    loan.returned_at = Some(now);
    loan.score = Some(score);
    txn.update_loan(&loan)?;

    let mut book = txn.find_book(book_id)?;
    book.average_rating = rating::average_score(&txn.returned_scores(book_id)?);
    txn.update_book(&book)?;

    Ok(loan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::RepositoryError;
    use crate::models::LoanId;

    /// Bare-bones in-memory store for exercising the engine directly.
    #[derive(Default)]
    struct MemTxn {
        books: Vec<Book>,
        loans: Vec<Loan>,
        next_loan_id: i64,
        fail_book_update: bool,
    }

    impl MemTxn {
        fn with_book(id: i64) -> Self {
            Self {
                books: vec![Book {
                    id: BookId(id),
                    name: format!("book-{id}"),
                    average_rating: None,
                }],
                loans: vec![],
                next_loan_id: 1,
                fail_book_update: false,
            }
        }
    }

    impl LendingTxn for MemTxn {
        fn find_active_loan(
            &mut self,
            book_id: BookId,
            user_id: Option<UserId>,
        ) -> RepositoryResult<Option<Loan>> {
            Ok(self
                .loans
                .iter()
                .find(|l| {
                    l.book_id == book_id
                        && l.is_active()
                        && user_id.is_none_or(|u| l.user_id == u)
                })
                .cloned())
        }

        fn insert_loan(
            &mut self,
            user_id: UserId,
            book_id: BookId,
            borrowed_at: DateTime<Utc>,
        ) -> RepositoryResult<Loan> {
            let loan = Loan {
                id: LoanId(self.next_loan_id),
                user_id,
                book_id,
                borrowed_at,
                returned_at: None,
                score: None,
            };
            self.next_loan_id += 1;
            self.loans.push(loan.clone());
            Ok(loan)
        }

        fn update_loan(&mut self, loan: &Loan) -> RepositoryResult<()> {
            let slot = self
                .loans
                .iter_mut()
                .find(|l| l.id == loan.id)
                .ok_or_else(|| RepositoryError::not_found("loan vanished"))?;
            *slot = loan.clone();
            Ok(())
        }

        fn find_book(&mut self, book_id: BookId) -> RepositoryResult<Book> {
            self.books
                .iter()
                .find(|b| b.id == book_id)
                .cloned()
                .ok_or_else(|| RepositoryError::not_found(format!("Book {book_id} not found")))
        }

        fn update_book(&mut self, book: &Book) -> RepositoryResult<()> {
            if self.fail_book_update {
                return Err(RepositoryError::query("injected book write failure"));
            }
            let slot = self
                .books
                .iter_mut()
                .find(|b| b.id == book.id)
                .ok_or_else(|| RepositoryError::not_found("book vanished"))?;
            *slot = book.clone();
            Ok(())
        }

        fn returned_scores(&mut self, book_id: BookId) -> RepositoryResult<Vec<Score>> {
            Ok(self
                .loans
                .iter()
                .filter(|l| l.book_id == book_id && !l.is_active())
                .filter_map(|l| l.score)
                .collect())
        }
    }

    fn score(v: f64) -> Score {
        Score::new(v).unwrap()
    }

    #[test]
    fn borrow_creates_active_loan() {
        let mut txn = MemTxn::with_book(1);
        let now = Utc::now();

        let loan = borrow(&mut txn, UserId(1), BookId(1), now).unwrap();
        assert_eq!(loan.borrowed_at, now);
        assert!(loan.returned_at.is_none());
        assert!(loan.score.is_none());
    }

    #[test]
    fn borrow_twice_by_same_user_is_rejected() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();

        let err = borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LendingError::AlreadyBorrowedBySameUser { user_id: UserId(1), book_id: BookId(1) }
        ));
        assert_eq!(txn.loans.len(), 1);
    }

    #[test]
    fn borrow_while_lent_to_other_user_is_rejected() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();

        let err = borrow(&mut txn, UserId(2), BookId(1), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            LendingError::AlreadyBorrowedByOther { book_id: BookId(1) }
        ));
    }

    #[test]
    fn return_closes_loan_and_updates_rating() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();

        let now = Utc::now();
        let loan = return_book(&mut txn, UserId(1), BookId(1), score(7.0), now).unwrap();
        assert_eq!(loan.returned_at, Some(now));
        assert_eq!(loan.score, Some(score(7.0)));
        assert_eq!(txn.books[0].average_rating, Some(7.0));
    }

    #[test]
    fn rating_includes_every_returned_loan() {
        let mut txn = MemTxn::with_book(1);

        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();
        return_book(&mut txn, UserId(1), BookId(1), score(5.0), Utc::now()).unwrap();

        borrow(&mut txn, UserId(2), BookId(1), Utc::now()).unwrap();
        return_book(&mut txn, UserId(2), BookId(1), score(4.0), Utc::now()).unwrap();

        assert_eq!(txn.books[0].average_rating, Some(4.5));
    }

    #[test]
    fn second_return_fails() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();
        return_book(&mut txn, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap();

        let err = return_book(&mut txn, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::ActiveLoanNotFound { .. }));
    }

    #[test]
    fn return_without_borrow_fails() {
        let mut txn = MemTxn::with_book(1);
        let err = return_book(&mut txn, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::ActiveLoanNotFound { .. }));
    }

    #[test]
    fn stale_active_row_is_caught_by_recheck() {
        let mut txn = MemTxn::with_book(1);
        let loan = borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();

        // Simulate a backend returning a row that was concurrently returned.
        struct StaleTxn(MemTxn, Loan);
        impl LendingTxn for StaleTxn {
            fn find_active_loan(
                &mut self,
                _book_id: BookId,
                _user_id: Option<UserId>,
            ) -> RepositoryResult<Option<Loan>> {
                let mut stale = self.1.clone();
                stale.returned_at = Some(Utc::now());
                Ok(Some(stale))
            }
            fn insert_loan(
                &mut self,
                user_id: UserId,
                book_id: BookId,
                borrowed_at: DateTime<Utc>,
            ) -> RepositoryResult<Loan> {
                self.0.insert_loan(user_id, book_id, borrowed_at)
            }
            fn update_loan(&mut self, loan: &Loan) -> RepositoryResult<()> {
                self.0.update_loan(loan)
            }
            fn find_book(&mut self, book_id: BookId) -> RepositoryResult<Book> {
                self.0.find_book(book_id)
            }
            fn update_book(&mut self, book: &Book) -> RepositoryResult<()> {
                self.0.update_book(book)
            }
            fn returned_scores(&mut self, book_id: BookId) -> RepositoryResult<Vec<Score>> {
                self.0.returned_scores(book_id)
            }
        }

        let mut stale = StaleTxn(txn, loan);
        let err =
            return_book(&mut stale, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::AlreadyReturned(_)));
    }

    #[test]
    fn borrow_after_return_succeeds() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();
        return_book(&mut txn, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap();

        let now = Utc::now();
        let loan = borrow(&mut txn, UserId(2), BookId(1), now).unwrap();
        assert_eq!(loan.borrowed_at, now);
        assert!(loan.is_active());
        assert_eq!(txn.loans.len(), 2);
    }

    #[test]
    fn failed_book_write_propagates_as_persistence_error() {
        let mut txn = MemTxn::with_book(1);
        borrow(&mut txn, UserId(1), BookId(1), Utc::now()).unwrap();
        txn.fail_book_update = true;

        let err = return_book(&mut txn, UserId(1), BookId(1), score(7.0), Utc::now()).unwrap_err();
        assert!(matches!(err, LendingError::Persistence(_)));
        // Rollback of the loan write is the enclosing transaction's job; the
        // repository tests cover that end to end.
    }
}
