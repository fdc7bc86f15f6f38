use crate::{
    agora::{self, AppConfig, AppState},
    auth::{
        BasicAuthConfig, CacheFailurePolicy, JwtAuthenticator, RateLimitConfig, UserResolver,
        rate_limit,
    },
    cache::redis::{self, RedisUserCache},
    cli::{
        commands::{auth, cache, database},
        telemetry,
    },
    store::postgres::PgStore,
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const DB_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub database: database::Options,
    pub auth: auth::Options,
    pub cache: cache::Options,
    pub rate_limit: RateLimitConfig,
}

/// Wire storage, cache, authenticator and limiter, then serve until shutdown.
/// # Errors
/// Returns an error if the database or Redis cannot be reached, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(args.database.max_connections)
        .idle_timeout(args.database.max_idle)
        .max_lifetime(DB_MAX_LIFETIME)
        .acquire_timeout(DB_ACQUIRE_TIMEOUT)
        .connect(&args.database.dsn)
        .await
        .context("Failed to connect to database")?;

    debug!(
        max_connections = args.database.max_connections,
        "database pool created"
    );

    let storage = PgStore::new(pool.clone(), args.database.query_timeout).into_storage();

    let authenticator = JwtAuthenticator::new(
        &args.auth.token_secret,
        &args.auth.token_issuer,
        args.auth.token_ttl,
    )
    .context("Invalid bearer token secret")?;

    let mut resolver = UserResolver::new(storage.users.clone())
        .with_cache_ttl(args.cache.ttl)
        .with_cache_timeout(args.cache.timeout)
        .with_storage_timeout(args.database.query_timeout)
        .with_policy(if args.cache.strict {
            CacheFailurePolicy::Strict
        } else {
            CacheFailurePolicy::Degrade
        });

    if let Some(url) = &args.cache.redis_url {
        let redis_pool = redis::connect(url, args.cache.pool_size).await?;
        resolver = resolver.with_cache(Arc::new(RedisUserCache::new(redis_pool)));
        info!(ttl_seconds = args.cache.ttl.as_secs(), "principal cache enabled");
    } else {
        info!("principal cache disabled");
    }

    let config = AppConfig::new(BasicAuthConfig {
        username: args.auth.basic_auth_user,
        password: args.auth.basic_auth_pass,
    })
    .with_invitation_ttl(args.auth.invitation_ttl);

    let state = AppState::new(storage, Arc::new(authenticator), config)?
        .with_resolver(resolver)
        .with_rate_limiter(rate_limit::from_config(args.rate_limit));

    let served = agora::new(args.port, state).await;

    pool.close().await;
    telemetry::shutdown_tracer();

    served
}
