//! Book repository trait for CRUD operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{Book, BookId};

/// Repository trait for book database operations.
///
/// Books are created and read here; the `average_rating` column is mutated
/// exclusively inside the return transaction in
/// [`LoanRepository::return_book`](super::LoanRepository::return_book) — there
/// is deliberately no general-purpose book update on this trait.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait BookRepository: Send + Sync {
    /// Check if the database connection is healthy.
    ///
    /// # Returns
    /// - `Ok(true)` if connection is healthy
    /// - `Ok(false)` if connection is unhealthy but no error occurred
    /// - `Err(RepositoryError)` if an error occurred during the check
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Create a new book and return the persisted row.
    ///
    /// # Arguments
    /// * `name` - Book name, validated at the transport boundary
    async fn create_book(&self, name: &str) -> RepositoryResult<Book>;

    /// Retrieve a book by ID.
    ///
    /// # Returns
    /// * `Ok(Book)` - The book row, including its current aggregate rating
    /// * `Err(RepositoryError::NotFound)` - If the book doesn't exist
    async fn find_book(&self, book_id: BookId) -> RepositoryResult<Book>;

    /// List all books.
    async fn list_books(&self) -> RepositoryResult<Vec<Book>>;
}
