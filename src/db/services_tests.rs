//! Unit tests for the service layer, run against the in-memory repository.

use super::repositories::LocalRepository;
use super::services;
use crate::lending::LendingError;
use crate::models::{BookId, Score, UserId};

fn score(v: f64) -> Score {
    Score::new(v).unwrap()
}

#[tokio::test]
async fn borrow_resolves_user_before_book() {
    let repo = LocalRepository::new();
    let book = services::create_book(&repo, "Solaris").await.unwrap();

    let err = services::borrow_book(&repo, UserId(99), book.id)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::UserNotFound(UserId(99))));
}

#[tokio::test]
async fn borrow_reports_missing_book() {
    let repo = LocalRepository::new();
    let user = services::create_user(&repo, "Kelvin").await.unwrap();

    let err = services::borrow_book(&repo, user.id, BookId(99))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::BookNotFound(BookId(99))));
}

#[tokio::test]
async fn borrow_then_return_updates_rating() {
    let repo = LocalRepository::new();
    let user = services::create_user(&repo, "Kelvin").await.unwrap();
    let book = services::create_book(&repo, "Solaris").await.unwrap();

    let loan = services::borrow_book(&repo, user.id, book.id).await.unwrap();
    assert!(loan.is_active());

    let returned = services::return_book(&repo, user.id, book.id, score(7.0))
        .await
        .unwrap();
    assert_eq!(returned.id, loan.id);
    assert_eq!(returned.score, Some(score(7.0)));

    let book = services::get_book(&repo, book.id).await.unwrap();
    assert_eq!(book.average_rating, Some(7.0));
}

#[tokio::test]
async fn return_without_active_loan_fails() {
    let repo = LocalRepository::new();
    let user = services::create_user(&repo, "Kelvin").await.unwrap();
    let book = services::create_book(&repo, "Solaris").await.unwrap();

    let err = services::return_book(&repo, user.id, book.id, score(5.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::ActiveLoanNotFound { .. }));
}

#[tokio::test]
async fn user_loans_requires_existing_user() {
    let repo = LocalRepository::new();

    let err = services::user_loans(&repo, UserId(1)).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn user_loans_lists_history() {
    let repo = LocalRepository::new();
    let user = services::create_user(&repo, "Kelvin").await.unwrap();
    let book = services::create_book(&repo, "Solaris").await.unwrap();

    services::borrow_book(&repo, user.id, book.id).await.unwrap();
    services::return_book(&repo, user.id, book.id, score(6.5))
        .await
        .unwrap();
    services::borrow_book(&repo, user.id, book.id).await.unwrap();

    let loans = services::user_loans(&repo, user.id).await.unwrap();
    assert_eq!(loans.len(), 2);
    assert!(!loans[0].is_active());
    assert!(loans[1].is_active());
}

#[tokio::test]
async fn list_operations() {
    let repo = LocalRepository::new();
    services::create_user(&repo, "a").await.unwrap();
    services::create_user(&repo, "b").await.unwrap();
    services::create_book(&repo, "x").await.unwrap();

    assert_eq!(services::list_users(&repo).await.unwrap().len(), 2);
    assert_eq!(services::list_books(&repo).await.unwrap().len(), 1);
    assert!(services::health_check(&repo).await.unwrap());
}
