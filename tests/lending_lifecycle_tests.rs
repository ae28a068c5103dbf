//! End-to-end lifecycle tests for the lending core against the in-memory
//! repository: the borrow/return state machine, the concurrency guarantees,
//! and failure atomicity.

use std::sync::Arc;

use biblio_rust::db::repositories::LocalRepository;
use biblio_rust::db::repository::LoanRepository;
use biblio_rust::db::services;
use biblio_rust::lending::LendingError;
use biblio_rust::models::Score;

fn score(v: f64) -> Score {
    Score::new(v).unwrap()
}

/// The canonical scenario: borrow, competing borrow, return with score,
/// double return.
#[tokio::test]
async fn full_lifecycle_scenario() {
    let repo = LocalRepository::new();
    let alice = services::create_user(&repo, "Alice").await.unwrap();
    let bob = services::create_user(&repo, "Bob").await.unwrap();
    let book = services::create_book(&repo, "Roadside Picnic").await.unwrap();

    // borrow(user=1, book=1) succeeds with an active loan
    let loan = services::borrow_book(&repo, alice.id, book.id).await.unwrap();
    assert!(loan.returned_at.is_none());

    // borrow(user=2, book=1) while loan 1 is active fails
    let err = services::borrow_book(&repo, bob.id, book.id).await.unwrap_err();
    assert!(matches!(err, LendingError::AlreadyBorrowedByOther { .. }));

    // return(user=1, book=1, score=7) closes the loan and rates the book
    let returned = services::return_book(&repo, alice.id, book.id, score(7.0))
        .await
        .unwrap();
    assert!(returned.returned_at.is_some());
    assert_eq!(returned.score, Some(score(7.0)));

    let book_after = services::get_book(&repo, book.id).await.unwrap();
    assert_eq!(book_after.average_rating, Some(7.0));

    // a second return of the same pair fails
    let err = services::return_book(&repo, alice.id, book.id, score(7.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::ActiveLoanNotFound { .. }));
}

#[tokio::test]
async fn borrow_after_return_creates_fresh_loan() {
    let repo = LocalRepository::new();
    let alice = services::create_user(&repo, "Alice").await.unwrap();
    let bob = services::create_user(&repo, "Bob").await.unwrap();
    let book = services::create_book(&repo, "Roadside Picnic").await.unwrap();

    let first = services::borrow_book(&repo, alice.id, book.id).await.unwrap();
    services::return_book(&repo, alice.id, book.id, score(8.0))
        .await
        .unwrap();

    let second = services::borrow_book(&repo, bob.id, book.id).await.unwrap();
    assert_ne!(second.id, first.id);
    assert!(second.returned_at.is_none());
    assert!(second.score.is_none());
    assert!(second.borrowed_at >= first.borrowed_at);
}

#[tokio::test]
async fn same_user_cannot_borrow_twice() {
    let repo = LocalRepository::new();
    let alice = services::create_user(&repo, "Alice").await.unwrap();
    let book = services::create_book(&repo, "Roadside Picnic").await.unwrap();

    services::borrow_book(&repo, alice.id, book.id).await.unwrap();
    let err = services::borrow_book(&repo, alice.id, book.id).await.unwrap_err();
    assert!(matches!(err, LendingError::AlreadyBorrowedBySameUser { .. }));
}

/// Concurrent borrow attempts on the same book: exactly one wins, every
/// loser sees the conflict error, and exactly one active loan exists after.
#[tokio::test]
async fn concurrent_borrows_have_exactly_one_winner() {
    const CONTENDERS: usize = 16;

    let repo = Arc::new(LocalRepository::new());
    let book = services::create_book(repo.as_ref(), "Contended").await.unwrap();

    let mut users = Vec::with_capacity(CONTENDERS);
    for i in 0..CONTENDERS {
        users.push(
            services::create_user(repo.as_ref(), &format!("user-{i}"))
                .await
                .unwrap(),
        );
    }

    let mut handles = Vec::with_capacity(CONTENDERS);
    for user in users {
        let repo = Arc::clone(&repo);
        let book_id = book.id;
        handles.push(tokio::spawn(async move {
            repo.borrow_book(user.id, book_id).await
        }));
    }

    let mut winners = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(loan) => {
                assert!(loan.is_active());
                winners += 1;
            }
            Err(LendingError::AlreadyBorrowedByOther { .. }) => conflicts += 1,
            Err(other) => panic!("unexpected error from concurrent borrow: {other}"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(conflicts, CONTENDERS - 1);
    assert!(repo
        .find_active_loan(book.id, None)
        .await
        .unwrap()
        .is_some());
    assert_eq!(repo.loan_count(), 1);
}

/// Concurrent returns on different books proceed independently; each book
/// ends with its own aggregate.
#[tokio::test]
async fn returns_on_different_books_are_independent() {
    let repo = Arc::new(LocalRepository::new());
    let user = services::create_user(repo.as_ref(), "Reader").await.unwrap();

    let mut books = Vec::new();
    for i in 0..4 {
        let book = services::create_book(repo.as_ref(), &format!("book-{i}"))
            .await
            .unwrap();
        services::borrow_book(repo.as_ref(), user.id, book.id)
            .await
            .unwrap();
        books.push(book);
    }

    let mut handles = Vec::new();
    for (i, book) in books.iter().enumerate() {
        let repo = Arc::clone(&repo);
        let user_id = user.id;
        let book_id = book.id;
        let s = score(i as f64 + 1.0);
        handles.push(tokio::spawn(async move {
            repo.return_book(user_id, book_id, s).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for (i, book) in books.iter().enumerate() {
        let after = services::get_book(repo.as_ref(), book.id).await.unwrap();
        assert_eq!(after.average_rating, Some(i as f64 + 1.0));
    }
}

/// Sequential returns on the same book: the second return's aggregate
/// includes the first's score.
#[tokio::test]
async fn second_return_sees_first_aggregate() {
    let repo = LocalRepository::new();
    let alice = services::create_user(&repo, "Alice").await.unwrap();
    let bob = services::create_user(&repo, "Bob").await.unwrap();
    let book = services::create_book(&repo, "Roadside Picnic").await.unwrap();

    services::borrow_book(&repo, alice.id, book.id).await.unwrap();
    services::return_book(&repo, alice.id, book.id, score(5.0))
        .await
        .unwrap();

    services::borrow_book(&repo, bob.id, book.id).await.unwrap();
    services::return_book(&repo, bob.id, book.id, score(4.0))
        .await
        .unwrap();

    let after = services::get_book(&repo, book.id).await.unwrap();
    assert_eq!(after.average_rating, Some(4.5));
}

/// Rounding lands on two decimal places across the whole flow.
#[tokio::test]
async fn aggregate_rating_rounds_to_two_decimals() {
    let repo = LocalRepository::new();
    let book = services::create_book(&repo, "Rated").await.unwrap();

    for (i, s) in [5.0, 4.0, 4.0].into_iter().enumerate() {
        let user = services::create_user(&repo, &format!("u{i}")).await.unwrap();
        services::borrow_book(&repo, user.id, book.id).await.unwrap();
        services::return_book(&repo, user.id, book.id, score(s))
            .await
            .unwrap();
    }

    let after = services::get_book(&repo, book.id).await.unwrap();
    assert_eq!(after.average_rating, Some(4.33));
}

/// If the book write fails mid-return, the loan must still be active
/// afterwards — no partial return is visible.
#[tokio::test]
async fn failed_return_leaves_no_partial_state() {
    let repo = LocalRepository::new();
    let alice = services::create_user(&repo, "Alice").await.unwrap();
    let book = services::create_book(&repo, "Fragile").await.unwrap();
    services::borrow_book(&repo, alice.id, book.id).await.unwrap();

    repo.set_book_writes_failing(true);
    let err = services::return_book(&repo, alice.id, book.id, score(9.0))
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Persistence(_)));

    let loan = repo
        .find_active_loan(book.id, Some(alice.id))
        .await
        .unwrap()
        .expect("loan must still be active after rollback");
    assert!(loan.returned_at.is_none());
    assert!(loan.score.is_none());
    assert!(services::get_book(&repo, book.id)
        .await
        .unwrap()
        .average_rating
        .is_none());
}
