//! Process-local principal cache with per-entry expiry.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheError, UserCache, user_key};
use crate::store::User;

#[derive(Debug, Default)]
pub struct MemoryUserCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryUserCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Entries that are never read again would otherwise stay forever.
    fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl UserCache for MemoryUserCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let key = user_key(id);
        let cached = self
            .entries
            .get(&key)
            .map(|entry| (entry.0.clone(), entry.1));
        match cached {
            Some((json, expires_at)) if expires_at > Instant::now() => {
                Ok(Some(serde_json::from_str(&json)?))
            }
            Some(_) => {
                self.entries
                    .remove_if(&key, |_, (_, expires_at)| *expires_at <= Instant::now());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User, ttl: Duration) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        let now = Instant::now();
        self.purge_expired(now);
        // An expiry past the clock's range is not cached at all
        if let Some(expires_at) = now.checked_add(ttl) {
            self.entries.insert(user_key(user.id), (json, expires_at));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use chrono::{DateTime, Utc};

    fn user(id: i64) -> User {
        User {
            id,
            username: format!("user{id}"),
            email: format!("user{id}@example.com"),
            role: Role {
                id: 1,
                name: "user".to_string(),
                description: String::new(),
                level: 1,
            },
            is_active: true,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = MemoryUserCache::new();
        cache
            .set(&user(1), Duration::from_secs(60))
            .await
            .expect("set");

        assert_eq!(cache.get(1).await.ok().flatten(), Some(user(1)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(cache.get(1).await, Ok(None)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn absent_entry_is_a_miss() {
        let cache = MemoryUserCache::new();
        assert!(matches!(cache.get(99).await, Ok(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_drops_expired_entries() {
        let cache = MemoryUserCache::new();
        cache.set(&user(1), Duration::from_secs(5)).await.expect("set");
        cache.set(&user(2), Duration::from_secs(60)).await.expect("set");
        tokio::time::advance(Duration::from_secs(10)).await;

        // User 1 is never read again; the next write clears it out
        cache.set(&user(3), Duration::from_secs(60)).await.expect("set");
        assert_eq!(cache.len(), 2);
        assert!(matches!(cache.get(2).await, Ok(Some(_))));
        assert!(matches!(cache.get(3).await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn unbounded_ttl_is_not_cached() {
        let cache = MemoryUserCache::new();
        cache.set(&user(1), Duration::MAX).await.expect("set");
        assert!(cache.is_empty());
    }
}
