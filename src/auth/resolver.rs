//! Cache-aside principal resolution.
//!
//! The cache is consulted first; on a miss the user is loaded from storage and
//! written back with a TTL. Concurrent misses for one id may both write; the
//! snapshots are identical so the last write wins. Entries are never
//! invalidated on mutation and go stale for at most one TTL.

use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{Span, debug, instrument, warn};

use crate::{
    cache::{CacheError, UserCache},
    store::{StoreError, User, UserStore},
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);
const STORAGE_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What to do when the cache itself fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheFailurePolicy {
    /// Log and fall through to storage.
    #[default]
    Degrade,
    /// Fail the resolution.
    Strict,
}

#[derive(Clone)]
pub struct UserResolver {
    users: Arc<dyn UserStore>,
    cache: Option<Arc<dyn UserCache>>,
    cache_ttl: Duration,
    cache_timeout: Duration,
    storage_timeout: Duration,
    policy: CacheFailurePolicy,
}

impl UserResolver {
    /// Resolver that always reads storage.
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            users,
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            policy: CacheFailurePolicy::Degrade,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn UserCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn cache_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// # Errors
    /// Storage errors, `NotFound` included, propagate unchanged. Cache errors
    /// only surface under [`CacheFailurePolicy::Strict`].
    #[instrument(skip(self), fields(cache_hit = tracing::field::Empty))]
    pub async fn resolve(&self, user_id: i64) -> Result<User, ResolveError> {
        let Some(cache) = &self.cache else {
            return Ok(self.load(user_id).await?);
        };

        match self.cache_get(cache.as_ref(), user_id).await {
            Ok(Some(user)) => {
                Span::current().record("cache_hit", true);
                return Ok(user);
            }
            Ok(None) => {}
            Err(err) => self.on_cache_error("read", user_id, err)?,
        }
        Span::current().record("cache_hit", false);

        let user = self.load(user_id).await?;

        if let Err(err) = self.cache_set(cache.as_ref(), &user).await {
            self.on_cache_error("write", user_id, err)?;
        }

        Ok(user)
    }

    fn on_cache_error(
        &self,
        operation: &'static str,
        user_id: i64,
        err: CacheError,
    ) -> Result<(), ResolveError> {
        match self.policy {
            CacheFailurePolicy::Degrade => {
                warn!(user_id, operation, error = %err, "user cache failed, using storage");
                Ok(())
            }
            CacheFailurePolicy::Strict => Err(err.into()),
        }
    }

    async fn cache_get(
        &self,
        cache: &dyn UserCache,
        user_id: i64,
    ) -> Result<Option<User>, CacheError> {
        tokio::time::timeout(self.cache_timeout, cache.get(user_id))
            .await
            .map_err(|_| CacheError::Timeout(self.cache_timeout))?
    }

    async fn cache_set(&self, cache: &dyn UserCache, user: &User) -> Result<(), CacheError> {
        tokio::time::timeout(self.cache_timeout, cache.set(user, self.cache_ttl))
            .await
            .map_err(|_| CacheError::Timeout(self.cache_timeout))?
    }

    /// Storage read with a timeout per attempt and bounded backoff on
    /// transient failures.
    async fn load(&self, user_id: i64) -> Result<User, StoreError> {
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(
                self.storage_timeout,
                self.users.get_by_id(user_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(self.storage_timeout)),
            };

            match result {
                Err(err) if err.is_transient() && attempt < STORAGE_ATTEMPTS => {
                    let delay = BACKOFF_BASE * 2u32.pow(attempt - 1);
                    debug!(user_id, attempt, error = %err, ?delay, "retrying user lookup");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
