//! Durable storage contracts.
//!
//! Handlers and the auth pipeline only see the traits below; `postgres` backs
//! them in production and `memory` backs them in tests and local runs. A
//! [`User`] never carries its credential: the password hash only travels
//! inside [`UserCredentials`], which is returned by the login lookup alone.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use utoipa::ToSchema;

/// Role assigned to every account created through registration.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("duplicate {0}")]
    Conflict(&'static str),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    /// Errors worth retrying: the query may succeed once the backend recovers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Database(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            ),
            Self::NotFound | Self::Conflict(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Position in the hierarchy; a higher level holds every permission of a lower one.
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// A user together with the stored password hash, used only to log in.
#[derive(Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user", &self.user)
            .field("password_hash", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// Invitation row as persisted: the digest of the token, never the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub digest: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;

    async fn get_credentials(&self, email: &str) -> Result<UserCredentials, StoreError>;

    /// Create the user and its invitation in a single transaction.
    async fn create_and_invite(
        &self,
        user: NewUser,
        invitation: NewInvitation,
    ) -> Result<User, StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn create_invitation(
        &self,
        user_id: i64,
        invitation: NewInvitation,
    ) -> Result<(), StoreError>;

    /// Consume the unexpired invitation matching `digest` and activate its
    /// user, atomically. Returns the activated user id.
    ///
    /// # Errors
    /// `StoreError::NotFound` when no unexpired invitation matches.
    async fn activate(&self, digest: &str, now: DateTime<Utc>) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Post, StoreError>;

    async fn update(&self, id: i64, patch: PostPatch) -> Result<Post, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Directed follow edges between users.
#[async_trait]
pub trait FollowerStore: Send + Sync {
    /// Record that `follower_id` follows `user_id`.
    ///
    /// # Errors
    /// `StoreError::Conflict("self")` when both ids are equal,
    /// `StoreError::Conflict("follow")` when the edge already exists and
    /// `StoreError::NotFound` when `user_id` does not exist.
    async fn follow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError>;

    /// Remove the edge if present; removing a missing edge succeeds.
    ///
    /// # Errors
    /// `StoreError::Conflict("self")` when both ids are equal.
    async fn unfollow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError>;
}

/// The set of stores the application runs against.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserStore>,
    pub roles: Arc<dyn RoleStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub posts: Arc<dyn PostStore>,
    pub followers: Arc<dyn FollowerStore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_timeouts_and_io() {
        assert!(StoreError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Conflict("email").is_transient());
    }

    #[test]
    fn user_snapshot_has_no_credential_field() {
        let user = User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role {
                id: 1,
                name: "user".to_string(),
                description: "regular account".to_string(),
                level: 1,
            },
            is_active: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&user).ok();
        let keys: Vec<String> = json
            .as_ref()
            .and_then(|value| value.as_object())
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default();
        assert!(keys.contains(&"username".to_string()));
        assert!(!keys.iter().any(|key| key.contains("password")));
    }

    #[test]
    fn credentials_debug_redacts_hash() {
        let credentials = UserCredentials {
            user: User {
                id: 1,
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                role: Role {
                    id: 1,
                    name: "user".to_string(),
                    description: String::new(),
                    level: 1,
                },
                is_active: false,
                created_at: DateTime::<Utc>::UNIX_EPOCH,
            },
            password_hash: "$argon2id$v=19$secret".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("argon2id"));
        assert!(rendered.contains("***"));
    }
}
