use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{books, loans, users};
use crate::db::repository::{RepositoryError, RepositoryResult};
use crate::models::{Book, BookId, Loan, LoanId, Score, User, UserId};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // Some fields used only for database operations
pub struct BookRow {
    pub book_id: i64,
    pub name: String,
    pub average_rating: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = books)]
pub struct NewBookRow {
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // Some fields used only for database operations
pub struct UserRow {
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUserRow {
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = loans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LoanRow {
    pub loan_id: i64,
    pub user_id: i64,
    pub book_id: i64,
    pub score: Option<f64>,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = loans)]
pub struct NewLoanRow {
    pub user_id: i64,
    pub book_id: i64,
    pub borrowed_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Book {
            id: BookId(row.book_id),
            name: row.name,
            average_rating: row.average_rating,
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.user_id),
            name: row.name,
        }
    }
}

impl LoanRow {
    /// Convert to the domain model, re-validating the stored score.
    pub fn into_loan(self) -> RepositoryResult<Loan> {
        let score = self
            .score
            .map(Score::new)
            .transpose()
            .map_err(|e| {
                RepositoryError::internal(format!(
                    "loan {} holds an invalid stored score: {e}",
                    self.loan_id
                ))
            })?;

        Ok(Loan {
            id: LoanId(self.loan_id),
            user_id: UserId(self.user_id),
            book_id: BookId(self.book_id),
            borrowed_at: self.borrowed_at,
            returned_at: self.returned_at,
            score,
        })
    }
}
