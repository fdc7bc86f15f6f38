//! Redis-backed principal cache.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fred::{
    clients::Pool,
    interfaces::{ClientLike, KeysInterface},
    types::{
        Builder, Expiration,
        config::{Config, ReconnectPolicy},
    },
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{Instrument, info, info_span, trace};

use super::{CacheError, UserCache, user_key};
use crate::store::User;

/// Connect a pool and verify it with a `PING`.
///
/// # Errors
/// Returns an error if the URL is invalid or the server cannot be reached.
pub async fn connect(url: &SecretString, pool_size: usize) -> Result<Pool> {
    let config = Config::from_url(url.expose_secret()).context("invalid redis url")?;

    let mut builder = Builder::from_config(config);
    builder.set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2));

    let pool = builder
        .build_pool(pool_size)
        .context("failed to build redis connection pool")?;

    pool.init().await.context("failed to connect to redis")?;

    let _: String = pool
        .ping(None)
        .await
        .context("redis PING failed after connect")?;

    info!(pool_size, "redis pool created and verified");

    Ok(pool)
}

#[derive(Clone)]
pub struct RedisUserCache {
    pool: Pool,
}

impl RedisUserCache {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let key = user_key(id);
        let span = info_span!("cache.get", cache.system = "redis", cache.key = %key);
        let value: Option<String> = self
            .pool
            .get::<Option<String>, _>(key.as_str())
            .instrument(span)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        match value {
            Some(json) => {
                trace!(key, "user cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User, ttl: Duration) -> Result<(), CacheError> {
        let key = user_key(user.id);
        let json = serde_json::to_string(user)?;
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1);
        let span = info_span!("cache.set", cache.system = "redis", cache.key = %key);

        let _: () = self
            .pool
            .set::<(), _, _>(key.as_str(), json, Some(Expiration::EX(seconds)), None, false)
            .instrument(span)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;

        trace!(key, ttl_secs = seconds, "user cache set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let url = SecretString::from("not a redis url");
        let result = connect(&url, 1).await;
        assert!(result.is_err());
    }
}
