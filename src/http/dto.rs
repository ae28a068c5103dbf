//! Data Transfer Objects for the HTTP API.
//!
//! These DTOs are used for request/response serialization in the REST API.
//! The book DTO is where the legacy `-1` "never rated" sentinel is produced;
//! internally the rating is an `Option`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lending::rating;
use crate::models::{Book, Loan, User};

/// Request body for creating a new book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBookRequest {
    /// Book name (non-empty, at most 250 characters)
    pub name: String,
}

/// Request body for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// User name (non-empty, at most 100 characters)
    pub name: String,
}

/// Request body for returning a borrowed book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnBookRequest {
    /// Loan score: numeric, 0-10 inclusive, at most 2 fractional digits.
    /// Range-checked in the handler before reaching the core.
    pub score: f64,
}

/// Book representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDto {
    pub id: i64,
    pub name: String,
    /// Rounded mean of returned-loan scores; `-1` when never rated.
    pub average_rating: f64,
}

impl From<Book> for BookDto {
    fn from(book: Book) -> Self {
        Self {
            id: book.id.value(),
            name: book.name,
            average_rating: rating::to_wire(book.average_rating),
        }
    }
}

/// User representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub id: i64,
    pub name: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id.value(),
            name: user.name,
        }
    }
}

/// Loan representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDto {
    pub id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub score: Option<f64>,
}

impl From<Loan> for LoanDto {
    fn from(loan: Loan) -> Self {
        Self {
            id: loan.id.value(),
            user_id: loan.user_id.value(),
            book_id: loan.book_id.value(),
            borrowed_at: loan.borrowed_at,
            returned_at: loan.returned_at,
            score: loan.score.map(|s| s.value()),
        }
    }
}

/// Response for book listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookListResponse {
    pub books: Vec<BookDto>,
    pub total: usize,
}

/// Response for user listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<UserDto>,
    pub total: usize,
}

/// Single user with their loan history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDetailResponse {
    pub id: i64,
    pub name: String,
    pub loans: Vec<LoanDto>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}
