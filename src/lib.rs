//! # Biblio Rust Backend
//!
//! Library-lending backend: books, users, and loan records with enforced
//! lending rules (one active loan per book, no double-return, rating
//! aggregation on return).
//!
//! The heart of the crate is the loan lifecycle state machine in [`lending`]:
//! borrow and return are read-then-write sequences over shared rows, so every
//! backend runs them inside one atomic scope. The rest is the production
//! surface around it: repository traits with in-memory and Postgres
//! implementations, a service layer, and an axum REST API.
//!
//! ## Architecture
//!
//! The crate is organized into several logical modules:
//!
//! - [`models`]: Domain types (Book, User, Loan, validated Score)
//! - [`lending`]: Loan lifecycle engine and rating aggregation
//! - [`db`]: Repository traits, persistence backends, and the service layer
//! - [`http`]: Axum-based HTTP server and request handlers
//!

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod lending;
pub mod models;

pub mod db;

#[cfg(feature = "http-server")]
pub mod http;
