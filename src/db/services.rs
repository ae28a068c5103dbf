//! High-level database service layer.
//!
//! This module provides repository-agnostic operations that work with any
//! implementation of the repository traits. The functions here contain the
//! orchestration that should be consistent regardless of the storage backend:
//! entity resolution before lending operations, and logging.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application Layer (REST API)                            │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services.rs)                             │
//! │  - User/Book resolution for borrow/return                │
//! │  - CRUD pass-throughs                                    │
//! └───────────────────┬─────────────────────────────────────┘
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/)                         │
//! │  - BookRepository / UserRepository / LoanRepository      │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌───────────────┴────────────────┐
//!     │                                │
//! ┌───▼──────────────┐     ┌──────────▼──────────────┐
//! │ Postgres         │     │ Local Repository        │
//! │ Repository       │     │ (in-memory)             │
//! └──────────────────┘     └─────────────────────────┘
//! ```
//!
//! The lending state machine itself lives in [`crate::lending::engine`] and
//! runs inside each repository's transaction scope — this layer only resolves
//! the referenced entities and delegates.

use log::info;

use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use crate::lending::{LendingError, LendingResult};
use crate::models::{Book, BookId, Loan, Score, User, UserId};

// ==================== Health & Connection ====================

/// Check if the database connection is healthy.
///
/// This is a simple pass-through to the repository's health check.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

// ==================== Book Operations ====================

/// Create a new book.
///
/// The name has already been validated at the transport boundary.
pub async fn create_book<R: FullRepository + ?Sized>(repo: &R, name: &str) -> RepositoryResult<Book> {
    let book = repo.create_book(name).await?;
    info!("Created book {} ({:?})", book.id, book.name);
    Ok(book)
}

/// Fetch a book by ID.
pub async fn get_book<R: FullRepository + ?Sized>(repo: &R, book_id: BookId) -> RepositoryResult<Book> {
    repo.find_book(book_id).await
}

/// List all books.
pub async fn list_books<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<Vec<Book>> {
    repo.list_books().await
}

// ==================== User Operations ====================

/// Create a new user.
pub async fn create_user<R: FullRepository + ?Sized>(repo: &R, name: &str) -> RepositoryResult<User> {
    let user = repo.create_user(name).await?;
    info!("Created user {} ({:?})", user.id, user.name);
    Ok(user)
}

/// Fetch a user by ID.
pub async fn get_user<R: FullRepository + ?Sized>(repo: &R, user_id: UserId) -> RepositoryResult<User> {
    repo.find_user(user_id).await
}

/// List all users.
pub async fn list_users<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<Vec<User>> {
    repo.list_users().await
}

/// All loans held by a user, active and returned.
pub async fn user_loans<R: FullRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
) -> RepositoryResult<Vec<Loan>> {
    // Resolve first so a missing user reports NotFound rather than an empty
    // list.
    repo.find_user(user_id).await?;
    repo.loans_for_user(user_id).await
}

// ==================== Lending Operations ====================

/// Borrow a book for a user.
///
/// Resolves both entities (mapping missing rows to the precise error kind),
/// then delegates to the repository's atomic borrow operation.
pub async fn borrow_book<R: FullRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    book_id: BookId,
) -> LendingResult<Loan> {
    let user = resolve_user(repo, user_id).await?;
    let book = resolve_book(repo, book_id).await?;

    let loan = repo.borrow_book(user.id, book.id).await?;
    info!("User {} borrowed book {} (loan {})", user.id, book.id, loan.id);
    Ok(loan)
}

/// Return a borrowed book, recording the loan score.
///
/// The score has already been validated at the transport boundary. The loan
/// update, rating recomputation, and book update happen atomically inside the
/// repository.
pub async fn return_book<R: FullRepository + ?Sized>(
    repo: &R,
    user_id: UserId,
    book_id: BookId,
    score: Score,
) -> LendingResult<Loan> {
    let user = resolve_user(repo, user_id).await?;
    let book = resolve_book(repo, book_id).await?;

    let loan = repo.return_book(user.id, book.id, score).await?;
    info!(
        "User {} returned book {} (loan {}, score {})",
        user.id, book.id, loan.id, score
    );
    Ok(loan)
}

async fn resolve_user<R: FullRepository + ?Sized>(repo: &R, user_id: UserId) -> LendingResult<User> {
    repo.find_user(user_id).await.map_err(|e| match e {
        RepositoryError::NotFound { .. } => LendingError::UserNotFound(user_id),
        other => LendingError::Persistence(other),
    })
}

async fn resolve_book<R: FullRepository + ?Sized>(repo: &R, book_id: BookId) -> LendingResult<Book> {
    repo.find_book(book_id).await.map_err(|e| match e {
        RepositoryError::NotFound { .. } => LendingError::BookNotFound(book_id),
        other => LendingError::Persistence(other),
    })
}
