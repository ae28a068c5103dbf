//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in
//! memory using HashMaps, providing fast, deterministic, and isolated
//! execution.
//!
//! # Atomicity
//!
//! The lending operations hold the data write-lock for their entire
//! check-then-act sequence, so concurrent borrows of the same book serialize
//! and exactly one succeeds. Failure-atomicity is provided by snapshotting
//! the store before the engine runs and restoring it on any error — the
//! in-memory analogue of a transaction rollback.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::db::repository::*;
use crate::lending::{engine, LendingResult, LendingTxn};
use crate::models::{Book, BookId, Loan, LoanId, Score, User, UserId};

/// In-memory local repository.
///
/// # Example
/// ```
/// use biblio_rust::db::repositories::LocalRepository;
/// use biblio_rust::db::repository::BookRepository;
///
/// #[tokio::main]
/// async fn main() {
///     let repo = LocalRepository::new();
///     let book = repo.create_book("Dune").await.unwrap();
///     assert_eq!(repo.find_book(book.id).await.unwrap().name, "Dune");
/// }
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

#[derive(Clone)]
struct LocalData {
    books: HashMap<BookId, Book>,
    users: HashMap<UserId, User>,
    loans: HashMap<LoanId, Loan>,

    // ID counters
    next_book_id: i64,
    next_user_id: i64,
    next_loan_id: i64,

    // Connection health
    is_healthy: bool,
    // Fault injection: make book writes fail to exercise rollback paths.
    fail_book_writes: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            books: HashMap::new(),
            users: HashMap::new(),
            loans: HashMap::new(),
            next_book_id: 1,
            next_user_id: 1,
            next_loan_id: 1,
            is_healthy: true,
            fail_book_writes: false,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        let mut data = self.data.write().unwrap();
        data.is_healthy = healthy;
    }

    /// Make every book write fail, for exercising rollback behavior in tests.
    pub fn set_book_writes_failing(&self, failing: bool) {
        let mut data = self.data.write().unwrap();
        data.fail_book_writes = failing;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write().unwrap();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Get the number of books stored.
    pub fn book_count(&self) -> usize {
        self.data.read().unwrap().books.len()
    }

    /// Get the number of loans stored (active and returned).
    pub fn loan_count(&self) -> usize {
        self.data.read().unwrap().loans.len()
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        let data = self.data.read().unwrap();
        if !data.is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }

    /// Run the lending engine under the write lock with rollback on error.
    ///
    /// Holding the write lock for the whole closure serializes competing
    /// lending operations; the snapshot restore makes failed operations
    /// invisible, matching the transactional backends.
    fn run_in_txn<T>(
        &self,
        f: impl FnOnce(&mut LocalTxn<'_>) -> LendingResult<T>,
    ) -> LendingResult<T> {
        self.check_health()?;
        let mut data = self.data.write().unwrap();
        let snapshot = data.clone();

        let result = f(&mut LocalTxn { data: &mut *data });
        if result.is_err() {
            *data = snapshot;
        }
        result
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction-scoped view over the locked store.
struct LocalTxn<'a> {
    data: &'a mut LocalData,
}

impl LendingTxn for LocalTxn<'_> {
    fn find_active_loan(
        &mut self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>> {
        Ok(self
            .data
            .loans
            .values()
            .find(|l| {
                l.book_id == book_id && l.is_active() && user_id.is_none_or(|u| l.user_id == u)
            })
            .cloned())
    }

    fn insert_loan(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        borrowed_at: chrono::DateTime<Utc>,
    ) -> RepositoryResult<Loan> {
        // Mimic the foreign keys the Postgres backend enforces.
        if !self.data.users.contains_key(&user_id) {
            return Err(RepositoryError::query_with_context(
                "loan references missing user",
                ErrorContext::new("insert_loan")
                    .with_entity("user")
                    .with_entity_id(user_id),
            ));
        }
        if !self.data.books.contains_key(&book_id) {
            return Err(RepositoryError::query_with_context(
                "loan references missing book",
                ErrorContext::new("insert_loan")
                    .with_entity("book")
                    .with_entity_id(book_id),
            ));
        }

        let loan = Loan {
            id: LoanId(self.data.next_loan_id),
            user_id,
            book_id,
            borrowed_at,
            returned_at: None,
            score: None,
        };
        self.data.next_loan_id += 1;
        self.data.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    fn update_loan(&mut self, loan: &Loan) -> RepositoryResult<()> {
        match self.data.loans.get_mut(&loan.id) {
            Some(slot) => {
                *slot = loan.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found(format!(
                "Loan {} not found",
                loan.id
            ))),
        }
    }

    fn find_book(&mut self, book_id: BookId) -> RepositoryResult<Book> {
        self.data
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("Book {} not found", book_id)))
    }

    fn update_book(&mut self, book: &Book) -> RepositoryResult<()> {
        if self.data.fail_book_writes {
            return Err(RepositoryError::query_with_context(
                "injected book write failure",
                ErrorContext::new("update_book")
                    .with_entity("book")
                    .with_entity_id(book.id),
            ));
        }
        match self.data.books.get_mut(&book.id) {
            Some(slot) => {
                *slot = book.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found(format!(
                "Book {} not found",
                book.id
            ))),
        }
    }

    fn returned_scores(&mut self, book_id: BookId) -> RepositoryResult<Vec<Score>> {
        Ok(self
            .data
            .loans
            .values()
            .filter(|l| l.book_id == book_id && !l.is_active())
            .filter_map(|l| l.score)
            .collect())
    }
}

#[async_trait]
impl BookRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        let data = self.data.read().unwrap();
        Ok(data.is_healthy)
    }

    async fn create_book(&self, name: &str) -> RepositoryResult<Book> {
        self.check_health()?;

        let mut data = self.data.write().unwrap();
        let book = Book {
            id: BookId(data.next_book_id),
            name: name.to_string(),
            average_rating: None,
        };
        data.next_book_id += 1;
        data.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn find_book(&self, book_id: BookId) -> RepositoryResult<Book> {
        let data = self.data.read().unwrap();
        data.books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("Book {} not found", book_id)))
    }

    async fn list_books(&self) -> RepositoryResult<Vec<Book>> {
        let data = self.data.read().unwrap();

        let mut books: Vec<Book> = data.books.values().cloned().collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }
}

#[async_trait]
impl UserRepository for LocalRepository {
    async fn create_user(&self, name: &str) -> RepositoryResult<User> {
        self.check_health()?;

        let mut data = self.data.write().unwrap();
        let user = User {
            id: UserId(data.next_user_id),
            name: name.to_string(),
        };
        data.next_user_id += 1;
        data.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, user_id: UserId) -> RepositoryResult<User> {
        let data = self.data.read().unwrap();
        data.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(format!("User {} not found", user_id)))
    }

    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        let data = self.data.read().unwrap();

        let mut users: Vec<User> = data.users.values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }
}

#[async_trait]
impl LoanRepository for LocalRepository {
    async fn find_active_loan(
        &self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>> {
        let data = self.data.read().unwrap();
        Ok(data
            .loans
            .values()
            .find(|l| {
                l.book_id == book_id && l.is_active() && user_id.is_none_or(|u| l.user_id == u)
            })
            .cloned())
    }

    async fn find_returned_loans(&self, book_id: BookId) -> RepositoryResult<Vec<Loan>> {
        let data = self.data.read().unwrap();

        let mut loans: Vec<Loan> = data
            .loans
            .values()
            .filter(|l| l.book_id == book_id && !l.is_active())
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.id);
        Ok(loans)
    }

    async fn loans_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Loan>> {
        let data = self.data.read().unwrap();

        let mut loans: Vec<Loan> = data
            .loans
            .values()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.id);
        Ok(loans)
    }

    async fn borrow_book(&self, user_id: UserId, book_id: BookId) -> LendingResult<Loan> {
        self.run_in_txn(|txn| engine::borrow(txn, user_id, book_id, Utc::now()))
    }

    async fn return_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        score: Score,
    ) -> LendingResult<Loan> {
        self.run_in_txn(|txn| engine::return_book(txn, user_id, book_id, score, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lending::LendingError;

    fn score(v: f64) -> Score {
        Score::new(v).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let repo = LocalRepository::new();
        assert!(repo.health_check().await.unwrap());

        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_and_find_book() {
        let repo = LocalRepository::new();

        let book = repo.create_book("The Dispossessed").await.unwrap();
        assert_eq!(book.name, "The Dispossessed");
        assert!(book.average_rating.is_none());

        let found = repo.find_book(book.id).await.unwrap();
        assert_eq!(found, book);
    }

    #[tokio::test]
    async fn test_list_books_sorted() {
        let repo = LocalRepository::new();
        repo.create_book("A").await.unwrap();
        repo.create_book("B").await.unwrap();

        let books = repo.list_books().await.unwrap();
        assert_eq!(books.len(), 2);
        assert!(books[0].id < books[1].id);
    }

    #[tokio::test]
    async fn test_not_found_error() {
        let repo = LocalRepository::new();

        let result = repo.find_book(BookId(999)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));

        let result = repo.find_user(UserId(999)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_borrow_and_return_roundtrip() {
        let repo = LocalRepository::new();
        let user = repo.create_user("Shevek").await.unwrap();
        let book = repo.create_book("The Dispossessed").await.unwrap();

        let loan = repo.borrow_book(user.id, book.id).await.unwrap();
        assert!(loan.is_active());
        assert_eq!(
            repo.find_active_loan(book.id, None).await.unwrap().unwrap().id,
            loan.id
        );

        let returned = repo.return_book(user.id, book.id, score(7.0)).await.unwrap();
        assert!(!returned.is_active());
        assert_eq!(returned.score, Some(score(7.0)));

        assert!(repo.find_active_loan(book.id, None).await.unwrap().is_none());
        assert_eq!(repo.find_book(book.id).await.unwrap().average_rating, Some(7.0));
        assert_eq!(repo.find_returned_loans(book.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_borrow_missing_book_is_query_error() {
        let repo = LocalRepository::new();
        let user = repo.create_user("Shevek").await.unwrap();

        // The service layer resolves entities first; going through the
        // repository directly surfaces the foreign-key failure.
        let err = repo.borrow_book(user.id, BookId(42)).await.unwrap_err();
        assert!(matches!(err, LendingError::Persistence(_)));
        assert_eq!(repo.loan_count(), 0);
    }

    #[tokio::test]
    async fn test_unhealthy_repository_rejects_lending_ops() {
        let repo = LocalRepository::new();
        let user = repo.create_user("u").await.unwrap();
        let book = repo.create_book("b").await.unwrap();
        repo.set_healthy(false);

        let err = repo.borrow_book(user.id, book.id).await.unwrap_err();
        assert!(matches!(err, LendingError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_return_rolls_back_when_book_write_fails() {
        let repo = LocalRepository::new();
        let user = repo.create_user("u").await.unwrap();
        let book = repo.create_book("b").await.unwrap();
        repo.borrow_book(user.id, book.id).await.unwrap();

        repo.set_book_writes_failing(true);
        let err = repo.return_book(user.id, book.id, score(7.0)).await.unwrap_err();
        assert!(matches!(err, LendingError::Persistence(_)));

        // The loan update must have been rolled back with the book write.
        let loan = repo.find_active_loan(book.id, Some(user.id)).await.unwrap();
        assert!(loan.is_some(), "loan must still be active after rollback");
        assert!(loan.unwrap().score.is_none());
        assert!(repo.find_book(book.id).await.unwrap().average_rating.is_none());

        // And the operation succeeds once the fault clears.
        repo.set_book_writes_failing(false);
        let returned = repo.return_book(user.id, book.id, score(7.0)).await.unwrap();
        assert!(!returned.is_active());
    }

    #[tokio::test]
    async fn test_clear() {
        let repo = LocalRepository::new();
        repo.create_book("b").await.unwrap();
        assert_eq!(repo.book_count(), 1);

        repo.clear();
        assert_eq!(repo.book_count(), 0);
    }
}
