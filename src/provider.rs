//! External collaborators consumed by the core: the user/folder data provider.
//!
//! These traits describe a narrow contract; implementations (persistence, KMS,
//! plugin loading) live outside this crate and are out of scope here.

use crate::error::ConnError;
use crate::user::User;
use async_trait::async_trait;

/// Validation failure returned by [`DataProvider::add_user`]/[`DataProvider::update_user`].
#[derive(Debug, thiserror::Error)]
#[error("invalid user record: {0}")]
pub struct ValidationError(pub String);

/// Persists and looks up users and their virtual folders. All methods are
/// blocking at the provider's discretion; the core never assumes in-process state.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Lists every known username.
    async fn get_users(&self) -> Result<Vec<String>, ConnError>;

    /// Whether `username` exists.
    async fn user_exists(&self, username: &str) -> Result<bool, ConnError>;

    /// Loads the full record for `username`, if it exists.
    async fn get_user(&self, username: &str) -> Result<Option<User>, ConnError>;

    /// Adds a new user record.
    async fn add_user(&self, user: &User) -> Result<(), ValidationError>;

    /// Replaces an existing user record.
    async fn update_user(&self, user: &User) -> Result<(), ValidationError>;

    /// Removes a user record and all associated folder quota state.
    async fn delete_user(&self, username: &str) -> Result<(), ConnError>;
}
