//! Registration and bearer token issuance.

use axum::{Json, extract::State, http::StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    agora::{error::ApiError, state::AppState},
    auth::password,
    store::{DEFAULT_ROLE, NewUser, StoreError, User},
};

#[derive(ToSchema, Deserialize)]
pub struct RegisterUserPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for RegisterUserPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterUserPayload")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserWithToken {
    pub user: User,
    /// One-time activation token; it is not retrievable again.
    pub token: String,
}

#[derive(ToSchema, Deserialize)]
pub struct CreateTokenPayload {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub token: String,
}

async fn hash_password(plain: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || password::hash(&plain))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_password(plain: String, phc: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || password::verify(&plain, &phc))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn verify_decoy(plain: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || password::verify_decoy(&plain))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[utoipa::path(
    post,
    path= "/v1/authentication/user",
    request_body = RegisterUserPayload,
    responses (
        (status = 201, description = "User registered, activation pending", body = UserWithToken),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email or username already taken"),
    ),
    tag= "authentication"
)]
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserPayload>,
) -> Result<(StatusCode, Json<UserWithToken>), ApiError> {
    state
        .validator
        .registration(&payload.username, &payload.email, &payload.password)
        .map_err(ApiError::BadRequest)?;

    let password_hash = hash_password(payload.password).await?;

    let (user, token) = state
        .invitations
        .register(
            NewUser {
                username: payload.username,
                email: payload.email,
                password_hash,
                role: DEFAULT_ROLE.to_string(),
            },
            state.config.invitation_ttl(),
        )
        .await?;

    info!(user_id = user.id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(UserWithToken {
            user,
            token: token.expose_secret().to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path= "/v1/authentication/token",
    request_body = CreateTokenPayload,
    responses (
        (status = 201, description = "Bearer token issued", body = TokenResponse),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Invalid credentials or inactive account"),
    ),
    tag= "authentication"
)]
#[instrument(skip_all)]
pub async fn create_token(
    State(state): State<AppState>,
    Json(payload): Json<CreateTokenPayload>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    state
        .validator
        .login(&payload.email, &payload.password)
        .map_err(ApiError::BadRequest)?;

    let credentials = match state.storage.users.get_credentials(&payload.email).await {
        Ok(credentials) => credentials,
        Err(StoreError::NotFound) => {
            verify_decoy(payload.password).await?;
            return Err(ApiError::Unauthenticated);
        }
        Err(err) => return Err(err.into()),
    };

    if !verify_password(payload.password, credentials.password_hash).await? {
        return Err(ApiError::Unauthenticated);
    }
    if !credentials.user.is_active {
        return Err(ApiError::Unauthenticated);
    }

    let token = state.authenticator.issue_for(credentials.user.id)?;

    info!(user_id = credentials.user.id, "bearer token issued");

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}
