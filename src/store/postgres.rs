//! `PostgreSQL` implementation of the storage contracts.
//!
//! Every statement runs inside a `db.query` span and is bounded by the
//! configured query timeout; a slow database surfaces as
//! [`StoreError::Timeout`] instead of stalling the request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{Instrument, info_span, warn};

use super::{
    FollowerStore, InvitationStore, NewInvitation, NewPost, NewUser, Post, PostPatch, PostStore,
    Role, RoleStore, Storage, StoreError, User, UserCredentials, UserStore,
};

const USER_COLUMNS: &str = r"
    users.id, users.username, users.email, users.is_active, users.created_at,
    roles.id AS role_id, roles.name AS role_name,
    roles.description AS role_description, roles.level AS role_level
";

/// Storage backed by a shared connection pool.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Expose every store trait through one shared pool.
    #[must_use]
    pub fn into_storage(self) -> Storage {
        let store = Arc::new(self);
        Storage {
            users: store.clone(),
            roles: store.clone(),
            invitations: store.clone(),
            posts: store.clone(),
            followers: store,
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, query: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = operation,
            db.statement = query
        );
        match tokio::time::timeout(self.query_timeout, fut.instrument(span)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(map_sqlx_error(err)),
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        match tokio::time::timeout(self.query_timeout, self.pool.begin()).await {
            Ok(Ok(tx)) => Ok(tx),
            Ok(Err(err)) => Err(map_sqlx_error(err)),
            Err(_) => Err(StoreError::Timeout(self.query_timeout)),
        }
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::RowNotFound = err {
        return StoreError::NotFound;
    }
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                return match db_err.constraint() {
                    Some("users_email_key") => StoreError::Conflict("email"),
                    Some("users_username_key") => StoreError::Conflict("username"),
                    Some("followers_pkey") => StoreError::Conflict("follow"),
                    _ => StoreError::Conflict("record"),
                };
            }
            // Foreign key: the referenced user is gone
            Some("23503") if db_err.constraint() == Some("followers_user_id_fkey") => {
                return StoreError::NotFound;
            }
            Some("23514") if db_err.constraint() == Some("followers_not_self") => {
                return StoreError::Conflict("self");
            }
            _ => {}
        }
    }
    StoreError::Database(err)
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        role: Role {
            id: row.try_get("role_id")?,
            name: row.try_get("role_name")?,
            description: row.try_get("role_description")?,
            level: row.try_get("role_level")?,
        },
    })
}

fn post_from_row(row: &PgRow) -> Result<Post, sqlx::Error> {
    Ok(Post {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        tags: row.try_get("tags")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users JOIN roles ON roles.id = users.role_id WHERE users.id = $1"
        );
        let row = self
            .bounded(
                "SELECT",
                &query,
                sqlx::query(&query).bind(id).fetch_optional(&self.pool),
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        user_from_row(&row).map_err(map_sqlx_error)
    }

    async fn get_credentials(&self, email: &str) -> Result<UserCredentials, StoreError> {
        let query = format!(
            "SELECT {USER_COLUMNS}, users.password FROM users JOIN roles ON roles.id = users.role_id WHERE users.email = $1"
        );
        let row = self
            .bounded(
                "SELECT",
                &query,
                sqlx::query(&query).bind(email).fetch_optional(&self.pool),
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        let user = user_from_row(&row).map_err(map_sqlx_error)?;
        let password_hash: String = row.try_get("password").map_err(map_sqlx_error)?;
        Ok(UserCredentials {
            user,
            password_hash,
        })
    }

    async fn create_and_invite(
        &self,
        user: NewUser,
        invitation: NewInvitation,
    ) -> Result<User, StoreError> {
        // User row and invitation row commit together or not at all.
        let mut tx = self.begin().await?;

        let insert_user = r"
            INSERT INTO users (username, email, password, role_id)
            VALUES ($1, $2, $3, (SELECT id FROM roles WHERE name = $4))
            RETURNING id
        ";
        let row = self
            .bounded(
                "INSERT",
                insert_user,
                sqlx::query(insert_user)
                    .bind(&user.username)
                    .bind(&user.email)
                    .bind(&user.password_hash)
                    .bind(&user.role)
                    .fetch_one(&mut *tx),
            )
            .await?;
        let user_id: i64 = row.try_get("id").map_err(map_sqlx_error)?;

        let insert_invitation =
            "INSERT INTO user_invitations (token, user_id, expiry) VALUES ($1, $2, $3)";
        self.bounded(
            "INSERT",
            insert_invitation,
            sqlx::query(insert_invitation)
                .bind(&invitation.digest)
                .bind(user_id)
                .bind(invitation.expires_at)
                .execute(&mut *tx),
        )
        .await?;

        let select_user = format!(
            "SELECT {USER_COLUMNS} FROM users JOIN roles ON roles.id = users.role_id WHERE users.id = $1"
        );
        let row = self
            .bounded(
                "SELECT",
                &select_user,
                sqlx::query(&select_user).bind(user_id).fetch_one(&mut *tx),
            )
            .await?;
        let created = user_from_row(&row).map_err(map_sqlx_error)?;

        self.bounded("COMMIT", "COMMIT", tx.commit()).await?;

        Ok(created)
    }
}

#[async_trait]
impl RoleStore for PgStore {
    async fn get_by_name(&self, name: &str) -> Result<Role, StoreError> {
        let query = "SELECT id, name, description, level FROM roles WHERE name = $1";
        let row = self
            .bounded(
                "SELECT",
                query,
                sqlx::query(query).bind(name).fetch_optional(&self.pool),
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        Ok(Role {
            id: row.try_get("id").map_err(map_sqlx_error)?,
            name: row.try_get("name").map_err(map_sqlx_error)?,
            description: row.try_get("description").map_err(map_sqlx_error)?,
            level: row.try_get("level").map_err(map_sqlx_error)?,
        })
    }
}

#[async_trait]
impl InvitationStore for PgStore {
    async fn create_invitation(
        &self,
        user_id: i64,
        invitation: NewInvitation,
    ) -> Result<(), StoreError> {
        let query = "INSERT INTO user_invitations (token, user_id, expiry) VALUES ($1, $2, $3)";
        self.bounded(
            "INSERT",
            query,
            sqlx::query(query)
                .bind(&invitation.digest)
                .bind(user_id)
                .bind(invitation.expires_at)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn activate(&self, digest: &str, now: DateTime<Utc>) -> Result<i64, StoreError> {
        let mut tx = self.begin().await?;

        // Deleting the row is the consumption: a replayed token finds nothing.
        let consume = r"
            DELETE FROM user_invitations
            WHERE token = $1 AND expiry > $2
            RETURNING user_id
        ";
        let row = self
            .bounded(
                "DELETE",
                consume,
                sqlx::query(consume)
                    .bind(digest)
                    .bind(now)
                    .fetch_optional(&mut *tx),
            )
            .await?;

        let Some(row) = row else {
            // Nothing was written; a failed rollback only costs the connection.
            if let Err(err) = self.bounded("ROLLBACK", "ROLLBACK", tx.rollback()).await {
                warn!(error = %err, "rollback of unmatched invitation failed");
            }
            return Err(StoreError::NotFound);
        };
        let user_id: i64 = row.try_get("user_id").map_err(map_sqlx_error)?;

        let activate = "UPDATE users SET is_active = TRUE WHERE id = $1";
        self.bounded(
            "UPDATE",
            activate,
            sqlx::query(activate).bind(user_id).execute(&mut *tx),
        )
        .await?;

        self.bounded("COMMIT", "COMMIT", tx.commit()).await?;

        Ok(user_id)
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn create(&self, post: NewPost) -> Result<Post, StoreError> {
        let query = r"
            INSERT INTO posts (user_id, title, content, tags)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, title, content, tags, version, created_at, updated_at
        ";
        let row = self
            .bounded(
                "INSERT",
                query,
                sqlx::query(query)
                    .bind(post.user_id)
                    .bind(&post.title)
                    .bind(&post.content)
                    .bind(&post.tags)
                    .fetch_one(&self.pool),
            )
            .await?;
        post_from_row(&row).map_err(map_sqlx_error)
    }

    async fn get_by_id(&self, id: i64) -> Result<Post, StoreError> {
        let query = r"
            SELECT id, user_id, title, content, tags, version, created_at, updated_at
            FROM posts WHERE id = $1
        ";
        let row = self
            .bounded(
                "SELECT",
                query,
                sqlx::query(query).bind(id).fetch_optional(&self.pool),
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        post_from_row(&row).map_err(map_sqlx_error)
    }

    async fn update(&self, id: i64, patch: PostPatch) -> Result<Post, StoreError> {
        let query = r"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, user_id, title, content, tags, version, created_at, updated_at
        ";
        let row = self
            .bounded(
                "UPDATE",
                query,
                sqlx::query(query)
                    .bind(id)
                    .bind(patch.title)
                    .bind(patch.content)
                    .fetch_optional(&self.pool),
            )
            .await?
            .ok_or(StoreError::NotFound)?;
        post_from_row(&row).map_err(map_sqlx_error)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let query = "DELETE FROM posts WHERE id = $1";
        let result = self
            .bounded(
                "DELETE",
                query,
                sqlx::query(query).bind(id).execute(&self.pool),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl FollowerStore for PgStore {
    async fn follow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError> {
        if follower_id == user_id {
            return Err(StoreError::Conflict("self"));
        }
        let query = "INSERT INTO followers (user_id, follower_id) VALUES ($1, $2)";
        self.bounded(
            "INSERT",
            query,
            sqlx::query(query)
                .bind(user_id)
                .bind(follower_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn unfollow(&self, follower_id: i64, user_id: i64) -> Result<(), StoreError> {
        if follower_id == user_id {
            return Err(StoreError::Conflict("self"));
        }
        let query = "DELETE FROM followers WHERE user_id = $1 AND follower_id = $2";
        self.bounded(
            "DELETE",
            query,
            sqlx::query(query)
                .bind(user_id)
                .bind(follower_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
