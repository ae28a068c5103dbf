//! User repository trait for CRUD operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::models::{User, UserId};

/// Repository trait for user database operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user and return the persisted row.
    async fn create_user(&self, name: &str) -> RepositoryResult<User>;

    /// Retrieve a user by ID.
    ///
    /// # Returns
    /// * `Ok(User)` - The user row
    /// * `Err(RepositoryError::NotFound)` - If the user doesn't exist
    async fn find_user(&self, user_id: UserId) -> RepositoryResult<User>;

    /// List all users.
    async fn list_users(&self) -> RepositoryResult<Vec<User>>;
}
