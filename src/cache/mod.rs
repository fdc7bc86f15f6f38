//! Principal cache.
//!
//! Entries live under `user:<id>` as a JSON snapshot of [`User`], which has no
//! credential field. Absence of an entry is a miss, never an error.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::store::User;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache entry could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),
}

#[must_use]
pub fn user_key(id: i64) -> String {
    format!("user:{id}")
}

#[async_trait]
pub trait UserCache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError>;

    async fn set(&self, user: &User, ttl: Duration) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(user_key(42), "user:42");
        assert_eq!(user_key(-1), "user:-1");
    }
}
