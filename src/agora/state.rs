//! Shared application state and its configuration.

use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};

use super::validator::Validator;
use crate::{
    auth::{
        BasicAuthConfig, InvitationManager, RateLimiter, RoleAuthorizer, TokenAuthenticator,
        UserResolver, rate_limit::NoopRateLimiter,
    },
    store::Storage,
};

const DEFAULT_INVITATION_TTL_SECONDS: u64 = 3 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AppConfig {
    basic_auth: BasicAuthConfig,
    invitation_ttl: Duration,
}

impl AppConfig {
    #[must_use]
    pub fn new(basic_auth: BasicAuthConfig) -> Self {
        Self {
            basic_auth,
            invitation_ttl: Duration::from_secs(DEFAULT_INVITATION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_invitation_ttl(mut self, ttl: Duration) -> Self {
        self.invitation_ttl = ttl;
        self
    }

    #[must_use]
    pub fn basic_auth(&self) -> &BasicAuthConfig {
        &self.basic_auth
    }

    #[must_use]
    pub fn invitation_ttl(&self) -> Duration {
        self.invitation_ttl
    }
}

#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub authenticator: Arc<dyn TokenAuthenticator>,
    pub resolver: UserResolver,
    pub authorizer: RoleAuthorizer,
    pub invitations: InvitationManager,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub validator: Arc<Validator>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// State with an uncached resolver and rate limiting off.
    ///
    /// # Errors
    /// Returns an error if the payload validator cannot be built.
    pub fn new(
        storage: Storage,
        authenticator: Arc<dyn TokenAuthenticator>,
        config: AppConfig,
    ) -> Result<Self> {
        let validator = Validator::new().context("failed to build payload validator")?;
        Ok(Self {
            resolver: UserResolver::new(storage.users.clone()),
            authorizer: RoleAuthorizer::new(storage.roles.clone()),
            invitations: InvitationManager::new(
                storage.users.clone(),
                storage.invitations.clone(),
            ),
            rate_limiter: Arc::new(NoopRateLimiter),
            validator: Arc::new(validator),
            config: Arc::new(config),
            storage,
            authenticator,
        })
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: UserResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}
