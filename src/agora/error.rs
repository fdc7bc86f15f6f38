//! Boundary error type: every handler failure becomes one of these.
//!
//! Bodies are stable and never carry internal detail; the detail goes to the
//! log instead.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::{
    auth::{AuthorizeError, CredentialError, InvitationError, ResolveError, TokenError},
    store::StoreError,
};

pub const BASIC_REALM: &str = r#"Basic realm="restricted", charset="UTF-8""#;

#[derive(Debug)]
pub enum ApiError {
    Malformed,
    Unauthenticated,
    /// Basic-auth failure; carries the `WWW-Authenticate` challenge.
    BasicUnauthenticated,
    Forbidden,
    NotFound,
    Conflict(&'static str),
    BadRequest(String),
    RateLimited(Duration),
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed | Self::Unauthenticated | Self::BasicUnauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Malformed | Self::Unauthenticated | Self::BasicUnauthenticated => {
                "unauthorized".to_string()
            }
            Self::Forbidden => "forbidden".to_string(),
            Self::NotFound => "not found".to_string(),
            Self::Conflict("follow") => "already following that user".to_string(),
            Self::Conflict("self") => "users cannot follow themselves".to_string(),
            Self::Conflict(field) => format!("a user with that {field} already exists"),
            Self::BadRequest(reason) => reason.clone(),
            Self::RateLimited(_) => "rate limit exceeded".to_string(),
            Self::Internal(_) => "server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut headers = HeaderMap::new();

        match &self {
            Self::Internal(detail) => error!(%status, %detail, "request failed"),
            Self::RateLimited(retry_after) => {
                warn!(%status, ?retry_after, "request rate limited");
                let seconds = retry_after.as_secs().max(1);
                if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                    headers.insert(header::RETRY_AFTER, value);
                }
            }
            Self::BasicUnauthenticated => {
                warn!(%status, "basic authentication failed");
                headers.insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(BASIC_REALM),
                );
            }
            Self::Malformed | Self::Unauthenticated | Self::Forbidden => {
                warn!(%status, error = ?self, "request refused");
            }
            Self::NotFound | Self::Conflict(_) | Self::BadRequest(_) => {
                debug!(%status, error = ?self, "request rejected");
            }
        }

        (status, headers, Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<CredentialError> for ApiError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing => Self::Unauthenticated,
            CredentialError::Malformed => Self::Malformed,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidKey | TokenError::Encoding(_) => Self::Internal(err.to_string()),
            _ => {
                debug!(error = %err, "bearer token refused");
                Self::Unauthenticated
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::Conflict(field) => Self::Conflict(field),
            StoreError::Timeout(_) | StoreError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthorizeError> for ApiError {
    fn from(err: AuthorizeError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<InvitationError> for ApiError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::NotFound => Self::NotFound,
            InvitationError::Store(store) => store.into(),
            InvitationError::Entropy(_) | InvitationError::Ttl => Self::Internal(err.to_string()),
        }
    }
}

/// Principal resolution during authentication: a missing user is an
/// authentication failure, anything else is infrastructure.
impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Store(StoreError::NotFound) => Self::Unauthenticated,
            other => Self::Internal(other.to_string()),
        }
    }
}
