//! Repository trait definitions for database operations.
//!
//! This module provides a collection of focused repository traits that
//! abstract database operations. By splitting responsibilities across
//! multiple traits, implementations can be more focused and testable.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`book`]: Book CRUD operations
//! - [`user`]: User CRUD operations
//! - [`loan`]: Loan queries and the atomic borrow/return operations
//!
//! # Trait Composition
//!
//! A complete repository implementation implements all three traits:
//!
//! ```ignore
//! impl BookRepository for MyRepo { ... }
//! impl UserRepository for MyRepo { ... }
//! impl LoanRepository for MyRepo { ... }
//! ```
//!
//! For functions that need all repository capabilities, use the
//! [`FullRepository`] trait bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository>(repo: &R) -> Result<()> {
//!     let book = repo.create_book("Dune").await?;
//!     let user = repo.create_user("Paul").await?;
//!     repo.borrow_book(user.id, book.id).await?;
//!     Ok(())
//! }
//! ```

pub mod book;
pub mod error;
pub mod loan;
pub mod user;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use book::BookRepository;
pub use loan::LoanRepository;
pub use user::UserRepository;

/// Composite trait bound for a complete repository implementation.
///
/// This trait is automatically implemented for any type that implements all
/// three repository traits. Use this as a convenient bound when you need
/// access to all repository operations.
pub trait FullRepository: BookRepository + UserRepository + LoanRepository {}

// Blanket implementation: any type implementing all three traits automatically
// implements FullRepository
impl<T> FullRepository for T where T: BookRepository + UserRepository + LoanRepository {}
