//! Domain model types for the lending system.
//!
//! Three entities: [`Book`], [`User`], and [`Loan`]. A loan is *active* while
//! `returned_at` is `None`; returning it records the timestamp and a
//! [`Score`]. A book's `average_rating` is `None` until at least one loan has
//! been returned — the legacy wire sentinel `-1` exists only at the DTO
//! boundary, never in the domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a book name.
pub const MAX_BOOK_NAME_LEN: usize = 250;

/// Maximum length of a user name.
pub const MAX_USER_NAME_LEN: usize = 100;

macro_rules! id_newtype {
    ($(#[$docs:meta])* $name:ident) => {
        $(#[$docs])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Strongly-typed identifier for a book record.
    BookId
);
id_newtype!(
    /// Strongly-typed identifier for a user record.
    UserId
);
id_newtype!(
    /// Strongly-typed identifier for a loan record.
    LoanId
);

/// Error raised when constructing a [`Score`] from an invalid value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreError {
    #[error("score {0} is outside the valid range [0, 10]")]
    OutOfRange(f64),
    #[error("score {0} has more than 2 fractional digits")]
    TooManyFractionalDigits(f64),
}

/// A validated loan score: numeric, in `[0, 10]`, at most 2 fractional digits.
///
/// Construction goes through [`Score::new`], so a `Score` held anywhere in the
/// system is valid by construction. Serde round-trips through the raw `f64`.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Score(f64);

impl Score {
    pub const MIN: f64 = 0.0;
    pub const MAX: f64 = 10.0;

    /// Validate and wrap a raw score value.
    pub fn new(value: f64) -> Result<Self, ScoreError> {
        if !value.is_finite() || !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ScoreError::OutOfRange(value));
        }
        // Two fractional digits means value*100 lands on an integer, modulo
        // float representation noise (e.g. 7.07 * 100 = 707.0000000000001).
        let scaled = value * 100.0;
        if (scaled - scaled.round()).abs() > 1e-6 {
            return Err(ScoreError::TooManyFractionalDigits(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Score {
    type Error = ScoreError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> f64 {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A book that can be lent out, one copy per book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub name: String,
    /// Rounded mean of all returned-loan scores; `None` until first rating.
    pub average_rating: Option<f64>,
}

/// A registered library user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// A lending record tying one user to one book.
///
/// Created only by the borrow operation; transitions exactly once, via
/// return, from active to returned. Never deleted, never reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub user_id: UserId,
    pub book_id: BookId,
    /// Set at creation, immutable thereafter.
    pub borrowed_at: DateTime<Utc>,
    /// `None` while the loan is active.
    pub returned_at: Option<DateTime<Utc>>,
    /// Set on return, together with `returned_at`.
    pub score: Option<Score>,
}

impl Loan {
    /// Whether the book is currently out under this loan.
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }
}
