//! Postgres repository implementation using Diesel.
//!
//! This module implements the repository traits against a Postgres database.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Connection health monitoring and pool statistics
//! - Automatic migration execution
//!
//! ## Concurrency
//!
//! Borrow and return each run inside one Diesel transaction that first locks
//! the book row with `SELECT ... FOR UPDATE`. Competing operations on the
//! same book therefore serialize, while different books proceed in parallel.
//! A partial unique index (`loans_one_active_per_book`) backstops the
//! one-active-loan invariant at the storage layer. Failed operations roll
//! back as a unit; nothing is retried internally.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;

use crate::db::repository::{
    BookRepository, ErrorContext, LoanRepository, RepositoryError, RepositoryResult,
    UserRepository,
};
use crate::lending::{engine, LendingError, LendingResult, LendingTxn};
use crate::models::{Book, BookId, Loan, Score, User, UserId};

mod models;
mod schema;

use models::*;
use schema::{books, loans, users};

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
        }
    }
}

impl PostgresConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
    /// - `PG_POOL_MAX`: Maximum pool size (default: 10)
    /// - `PG_POOL_MIN`: Minimum pool size (default: 1)
    /// - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
    /// - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let max_pool_size = std::env::var("PG_POOL_MAX")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let min_pool_size = std::env::var("PG_POOL_MIN")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);

        let connection_timeout_sec = std::env::var("PG_CONN_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let idle_timeout_sec = std::env::var("PG_IDLE_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        Ok(Self {
            database_url,
            max_pool_size,
            min_pool_size,
            connection_timeout_sec,
            idle_timeout_sec,
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Pool health statistics.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of connections currently in use
    pub connections_in_use: u32,
    /// Number of idle connections
    pub idle_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum pool size
    pub max_size: u32,
    /// Total successful queries executed
    pub total_queries: u64,
    /// Total failed queries
    pub failed_queries: u64,
}

/// Diesel-backed repository for Postgres.
///
/// This repository implementation provides:
/// - Connection pooling with configurable limits
/// - Health monitoring and statistics
/// - Automatic schema migrations
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
    // Metrics counters
    total_queries: Arc<AtomicU64>,
    failed_queries: Arc<AtomicU64>,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    ///
    /// # Arguments
    /// * `config` - Database configuration
    ///
    /// # Returns
    /// * `Ok(PostgresRepository)` on success
    /// * `Err(RepositoryError)` if connection or migration fails
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true) // Validate connections before use
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        // Run migrations once during initialization
        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            Self::run_migrations(&mut conn)?;
        }

        Ok(Self {
            pool,
            config,
            total_queries: Arc::new(AtomicU64::new(0)),
            failed_queries: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run pending database migrations.
    fn run_migrations(conn: &mut PgConnection) -> RepositoryResult<()> {
        conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Migration failed: {}", e),
                ErrorContext::new("run_migrations"),
            )
        })?;

        Ok(())
    }

    /// Execute a database operation on a pooled connection.
    ///
    /// Diesel is synchronous, so the closure runs on the blocking thread
    /// pool. Errors are counted but never retried here; `is_retryable` on the
    /// error tells callers whether retrying could help.
    async fn with_conn<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<RepositoryError> + Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, E> + Send + 'static,
    {
        let pool = self.pool.clone();
        let total_queries = self.total_queries.clone();
        let failed_queries = self.failed_queries.clone();

        task::spawn_blocking(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(e) => {
                    failed_queries.fetch_add(1, Ordering::Relaxed);
                    return Err(E::from(RepositoryError::from(e)));
                }
            };

            total_queries.fetch_add(1, Ordering::Relaxed);
            match f(&mut conn) {
                Ok(result) => Ok(result),
                Err(e) => {
                    failed_queries.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| {
            E::from(RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            ))
        })?
    }

    /// Get pool health statistics.
    ///
    /// Returns current pool state and query statistics for monitoring.
    pub fn get_pool_stats(&self) -> PoolStats {
        let state = self.pool.state();
        PoolStats {
            connections_in_use: state.connections - state.idle_connections,
            idle_connections: state.idle_connections,
            total_connections: state.connections,
            max_size: self.config.max_pool_size,
            total_queries: self.total_queries.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
        }
    }

    /// Check if the database connection is healthy.
    ///
    /// Performs a simple query to verify connectivity.
    pub async fn is_healthy(&self) -> bool {
        self.health_check().await.unwrap_or(false)
    }

    /// Get detailed health information.
    ///
    /// Returns a tuple of (is_healthy, latency_ms, error_message).
    pub async fn health_check_detailed(&self) -> (bool, Option<u64>, Option<String>) {
        let start = Instant::now();
        match self.health_check().await {
            Ok(true) => (true, Some(start.elapsed().as_millis() as u64), None),
            Ok(false) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some("Health check returned false".to_string()),
            ),
            Err(e) => (
                false,
                Some(start.elapsed().as_millis() as u64),
                Some(e.to_string()),
            ),
        }
    }
}

fn map_diesel_error(err: diesel::result::Error) -> RepositoryError {
    RepositoryError::from(err)
}

/// Lock the book row for the duration of the surrounding transaction.
///
/// This is what serializes competing borrow/return calls on one book: the
/// second transaction blocks here until the first commits or rolls back, and
/// then observes its writes.
fn lock_book_row(conn: &mut PgConnection, book_id: BookId) -> LendingResult<()> {
    books::table
        .find(book_id.value())
        .select(books::book_id)
        .for_update()
        .first::<i64>(conn)
        .optional()
        .map_err(map_diesel_error)?
        .ok_or(LendingError::BookNotFound(book_id))?;
    Ok(())
}

fn query_active_loan(
    conn: &mut PgConnection,
    book_id: BookId,
    user_id: Option<UserId>,
) -> RepositoryResult<Option<Loan>> {
    let mut query = loans::table
        .filter(loans::book_id.eq(book_id.value()))
        .filter(loans::returned_at.is_null())
        .select(LoanRow::as_select())
        .into_boxed();

    if let Some(user_id) = user_id {
        query = query.filter(loans::user_id.eq(user_id.value()));
    }

    query
        .first::<LoanRow>(conn)
        .optional()
        .map_err(map_diesel_error)?
        .map(LoanRow::into_loan)
        .transpose()
}

fn load_returned_loans(conn: &mut PgConnection, book_id: BookId) -> RepositoryResult<Vec<Loan>> {
    loans::table
        .filter(loans::book_id.eq(book_id.value()))
        .filter(loans::returned_at.is_not_null())
        .order(loans::loan_id.asc())
        .select(LoanRow::as_select())
        .load::<LoanRow>(conn)
        .map_err(map_diesel_error)?
        .into_iter()
        .map(LoanRow::into_loan)
        .collect()
}

/// Transaction-scoped store view handed to the lending engine.
struct PgTxn<'a> {
    conn: &'a mut PgConnection,
}

impl LendingTxn for PgTxn<'_> {
    fn find_active_loan(
        &mut self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>> {
        query_active_loan(self.conn, book_id, user_id)
    }

    fn insert_loan(
        &mut self,
        user_id: UserId,
        book_id: BookId,
        borrowed_at: DateTime<Utc>,
    ) -> RepositoryResult<Loan> {
        let row: LoanRow = diesel::insert_into(loans::table)
            .values(NewLoanRow {
                user_id: user_id.value(),
                book_id: book_id.value(),
                borrowed_at,
            })
            .returning(LoanRow::as_returning())
            .get_result(self.conn)
            .map_err(map_diesel_error)?;

        row.into_loan()
    }

    fn update_loan(&mut self, loan: &Loan) -> RepositoryResult<()> {
        let updated = diesel::update(loans::table.find(loan.id.value()))
            .set((
                loans::returned_at.eq(loan.returned_at),
                loans::score.eq(loan.score.map(|s| s.value())),
            ))
            .execute(self.conn)
            .map_err(map_diesel_error)?;

        if updated == 0 {
            return Err(RepositoryError::not_found(format!(
                "Loan {} not found",
                loan.id
            )));
        }
        Ok(())
    }

    fn find_book(&mut self, book_id: BookId) -> RepositoryResult<Book> {
        books::table
            .find(book_id.value())
            .select(BookRow::as_select())
            .first::<BookRow>(self.conn)
            .optional()
            .map_err(map_diesel_error)?
            .map(Book::from)
            .ok_or_else(|| RepositoryError::not_found(format!("Book {} not found", book_id)))
    }

    fn update_book(&mut self, book: &Book) -> RepositoryResult<()> {
        let updated = diesel::update(books::table.find(book.id.value()))
            .set(books::average_rating.eq(book.average_rating))
            .execute(self.conn)
            .map_err(map_diesel_error)?;

        if updated == 0 {
            return Err(RepositoryError::not_found(format!(
                "Book {} not found",
                book.id
            )));
        }
        Ok(())
    }

    fn returned_scores(&mut self, book_id: BookId) -> RepositoryResult<Vec<Score>> {
        let raw: Vec<Option<f64>> = loans::table
            .filter(loans::book_id.eq(book_id.value()))
            .filter(loans::returned_at.is_not_null())
            .select(loans::score)
            .load(self.conn)
            .map_err(map_diesel_error)?;

        raw.into_iter()
            .flatten()
            .map(|value| {
                Score::new(value).map_err(|e| {
                    RepositoryError::internal(format!("stored score invalid: {e}"))
                })
            })
            .collect()
    }
}

#[async_trait]
impl BookRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(map_diesel_error)
        })
        .await
    }

    async fn create_book(&self, name: &str) -> RepositoryResult<Book> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let row: BookRow = diesel::insert_into(books::table)
                .values(NewBookRow { name })
                .returning(BookRow::as_returning())
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(Book::from(row))
        })
        .await
    }

    async fn find_book(&self, book_id: BookId) -> RepositoryResult<Book> {
        self.with_conn(move |conn| {
            books::table
                .find(book_id.value())
                .select(BookRow::as_select())
                .first::<BookRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(Book::from)
                .ok_or_else(|| RepositoryError::not_found(format!("Book {} not found", book_id)))
        })
        .await
    }

    async fn list_books(&self) -> RepositoryResult<Vec<Book>> {
        self.with_conn(|conn| {
            let rows = books::table
                .order(books::book_id.asc())
                .select(BookRow::as_select())
                .load::<BookRow>(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(Book::from).collect())
        })
        .await
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn create_user(&self, name: &str) -> RepositoryResult<User> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let row: UserRow = diesel::insert_into(users::table)
                .values(NewUserRow { name })
                .returning(UserRow::as_returning())
                .get_result(conn)
                .map_err(map_diesel_error)?;
            Ok(User::from(row))
        })
        .await
    }

    async fn find_user(&self, user_id: UserId) -> RepositoryResult<User> {
        self.with_conn(move |conn| {
            users::table
                .find(user_id.value())
                .select(UserRow::as_select())
                .first::<UserRow>(conn)
                .optional()
                .map_err(map_diesel_error)?
                .map(User::from)
                .ok_or_else(|| RepositoryError::not_found(format!("User {} not found", user_id)))
        })
        .await
    }

    async fn list_users(&self) -> RepositoryResult<Vec<User>> {
        self.with_conn(|conn| {
            let rows = users::table
                .order(users::user_id.asc())
                .select(UserRow::as_select())
                .load::<UserRow>(conn)
                .map_err(map_diesel_error)?;
            Ok(rows.into_iter().map(User::from).collect())
        })
        .await
    }
}

#[async_trait]
impl LoanRepository for PostgresRepository {
    async fn find_active_loan(
        &self,
        book_id: BookId,
        user_id: Option<UserId>,
    ) -> RepositoryResult<Option<Loan>> {
        self.with_conn(move |conn| query_active_loan(conn, book_id, user_id))
            .await
    }

    async fn find_returned_loans(&self, book_id: BookId) -> RepositoryResult<Vec<Loan>> {
        self.with_conn(move |conn| load_returned_loans(conn, book_id))
            .await
    }

    async fn loans_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Loan>> {
        self.with_conn(move |conn| {
            loans::table
                .filter(loans::user_id.eq(user_id.value()))
                .order(loans::loan_id.asc())
                .select(LoanRow::as_select())
                .load::<LoanRow>(conn)
                .map_err(map_diesel_error)?
                .into_iter()
                .map(LoanRow::into_loan)
                .collect()
        })
        .await
    }

    async fn borrow_book(&self, user_id: UserId, book_id: BookId) -> LendingResult<Loan> {
        self.with_conn(move |conn| {
            conn.transaction::<Loan, LendingError, _>(|tx| {
                lock_book_row(tx, book_id)?;
                engine::borrow(&mut PgTxn { conn: tx }, user_id, book_id, Utc::now())
            })
        })
        .await
    }

    async fn return_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        score: Score,
    ) -> LendingResult<Loan> {
        self.with_conn(move |conn| {
            conn.transaction::<Loan, LendingError, _>(|tx| {
                lock_book_row(tx, book_id)?;
                engine::return_book(&mut PgTxn { conn: tx }, user_id, book_id, score, Utc::now())
            })
        })
        .await
    }
}
