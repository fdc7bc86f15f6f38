//! Request gate middleware: admission control and operator basic auth.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::debug;

use super::{error::ApiError, state::AppState};
use crate::auth::{RateLimitDecision, credentials};

/// Reject with 429 once the client exhausts its window.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = credentials::client_key(request.headers(), peer);

    match state.rate_limiter.check(&key) {
        RateLimitDecision::Allowed => next.run(request).await,
        RateLimitDecision::Limited { retry_after } => {
            debug!(client = %key, "rate limit window exhausted");
            ApiError::RateLimited(retry_after).into_response()
        }
    }
}

/// Fail closed with a `WWW-Authenticate` challenge unless the configured
/// operator credentials are presented.
pub async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = credentials::basic_credentials(request.headers())
        .is_ok_and(|presented| state.config.basic_auth().matches(&presented));

    if authorized {
        next.run(request).await
    } else {
        ApiError::BasicUnauthenticated.into_response()
    }
}
