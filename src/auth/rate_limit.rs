//! Fixed-window admission control keyed by client address.

use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tracing::trace;

pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 20;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window: Duration,
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window: DEFAULT_WINDOW,
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after: Duration },
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, client_key: &str) -> RateLimitDecision;
}

/// Build the limiter described by `config`.
#[must_use]
pub fn from_config(config: RateLimitConfig) -> Arc<dyn RateLimiter> {
    if config.enabled {
        let limiter = Arc::new(FixedWindowLimiter::new(
            config.requests_per_window,
            config.window,
        ));
        limiter.clone().spawn_sweeper(config.window);
        limiter
    } else {
        Arc::new(NoopRateLimiter)
    }
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client_key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// At most `limit` requests per key in each window of length `window`. The
/// counter resets when a request arrives after the window has ended.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl FixedWindowLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    /// Remove windows that ended before `now`.
    pub fn sweep(&self) {
        let now = Instant::now();
        let window = self.window;
        self.windows
            .retain(|_, entry| now.duration_since(entry.started) < window);
    }

    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Sweep idle windows every `interval` while the limiter is alive.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                limiter.sweep();
                trace!(keys = limiter.tracked_keys(), "rate limit windows swept");
            }
        })
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, client_key: &str) -> RateLimitDecision {
        let now = Instant::now();
        // The entry guard serializes updates for one key.
        let mut entry = self
            .windows
            .entry(client_key.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });

        let elapsed = now.duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count < self.limit {
            entry.count += 1;
            RateLimitDecision::Allowed
        } else {
            let retry_after = self.window.saturating_sub(now.duration_since(entry.started));
            RateLimitDecision::Limited { retry_after }
        }
    }
}
