//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the service
//! layer for business logic. Request validation (name lengths, score range)
//! happens here, before anything reaches the core.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use super::dto::{
    BookDto, BookListResponse, CreateBookRequest, CreateUserRequest, HealthResponse, LoanDto,
    ReturnBookRequest, UserDetailResponse, UserDto, UserListResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::db::services as db_services;
use crate::models::{BookId, Score, UserId, MAX_BOOK_NAME_LEN, MAX_USER_NAME_LEN};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn validate_name(name: &str, max_len: usize, entity: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{entity} name must not be empty")));
    }
    if name.chars().count() > max_len {
        return Err(AppError::BadRequest(format!(
            "{entity} name must be at most {max_len} characters"
        )));
    }
    Ok(())
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and database is
/// accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Book CRUD
// =============================================================================

/// GET /v1/books
///
/// List all books.
pub async fn list_books(State(state): State<AppState>) -> HandlerResult<BookListResponse> {
    let books = db_services::list_books(state.repository.as_ref()).await?;

    let book_dtos: Vec<BookDto> = books.into_iter().map(Into::into).collect();
    let total = book_dtos.len();

    Ok(Json(BookListResponse {
        books: book_dtos,
        total,
    }))
}

/// POST /v1/books
///
/// Create a new book.
pub async fn create_book(
    State(state): State<AppState>,
    Json(request): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<BookDto>), AppError> {
    validate_name(&request.name, MAX_BOOK_NAME_LEN, "Book")?;

    let book = db_services::create_book(state.repository.as_ref(), &request.name).await?;
    Ok((StatusCode::CREATED, Json(book.into())))
}

/// GET /v1/books/{book_id}
///
/// Get a single book with its current aggregate rating.
pub async fn get_book(
    State(state): State<AppState>,
    Path(book_id): Path<i64>,
) -> HandlerResult<BookDto> {
    let book = db_services::get_book(state.repository.as_ref(), BookId::new(book_id)).await?;
    Ok(Json(book.into()))
}

// =============================================================================
// User CRUD
// =============================================================================

/// GET /v1/users
///
/// List all users.
pub async fn list_users(State(state): State<AppState>) -> HandlerResult<UserListResponse> {
    let users = db_services::list_users(state.repository.as_ref()).await?;

    let user_dtos: Vec<UserDto> = users.into_iter().map(Into::into).collect();
    let total = user_dtos.len();

    Ok(Json(UserListResponse {
        users: user_dtos,
        total,
    }))
}

/// POST /v1/users
///
/// Create a new user.
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserDto>), AppError> {
    validate_name(&request.name, MAX_USER_NAME_LEN, "User")?;

    let user = db_services::create_user(state.repository.as_ref(), &request.name).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// GET /v1/users/{user_id}
///
/// Get a single user together with their loan history.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> HandlerResult<UserDetailResponse> {
    let user_id = UserId::new(user_id);
    let user = db_services::get_user(state.repository.as_ref(), user_id).await?;
    let loans = db_services::user_loans(state.repository.as_ref(), user_id).await?;

    Ok(Json(UserDetailResponse {
        id: user.id.value(),
        name: user.name,
        loans: loans.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// Lending Operations
// =============================================================================

/// POST /v1/users/{user_id}/borrow/{book_id}
///
/// Borrow a book for a user. Fails with 409 when the book is already out.
pub async fn borrow_book(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(i64, i64)>,
) -> HandlerResult<LoanDto> {
    let loan = db_services::borrow_book(
        state.repository.as_ref(),
        UserId::new(user_id),
        BookId::new(book_id),
    )
    .await?;

    Ok(Json(loan.into()))
}

/// POST /v1/users/{user_id}/return/{book_id}
///
/// Return a borrowed book, recording the loan score. The score is validated
/// here; the loan update and rating recomputation are atomic in the
/// repository.
pub async fn return_book(
    State(state): State<AppState>,
    Path((user_id, book_id)): Path<(i64, i64)>,
    Json(request): Json<ReturnBookRequest>,
) -> HandlerResult<LoanDto> {
    let score = Score::new(request.score).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let loan = db_services::return_book(
        state.repository.as_ref(),
        UserId::new(user_id),
        BookId::new(book_id),
        score,
    )
    .await?;

    Ok(Json(loan.into()))
}
