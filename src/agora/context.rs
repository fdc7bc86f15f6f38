//! Authenticated request context.
//!
//! Handlers that need a principal take [`RequestContext`] as an argument; the
//! extractor runs the bearer pipeline and rejects before the handler body runs.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::Span;

use super::{error::ApiError, state::AppState};
use crate::{
    auth::{BearerClaims, credentials},
    store::User,
};

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub principal: User,
    pub claims: BearerClaims,
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = credentials::bearer_token(&parts.headers)?;
        let claims = state.authenticator.validate_token(token)?;
        let principal = state.resolver.resolve(claims.sub).await?;

        Span::current().record("user_id", principal.id);

        Ok(Self { principal, claims })
    }
}
