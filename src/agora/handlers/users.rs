use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, instrument};

use crate::{
    agora::{context::RequestContext, error::ApiError, state::AppState},
    auth::ResolveError,
    store::User,
};

#[utoipa::path(
    put,
    path= "/v1/users/activate/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses (
        (status = 204, description = "User activated"),
        (status = 404, description = "Invitation unknown, expired or already used"),
    ),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.invitations.activate(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path= "/v1/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses (
        (status = 200, description = "User", body = User),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "User not found"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    if id == context.principal.id {
        return Ok(Json(context.principal));
    }
    let user = state.resolver.resolve(id).await.map_err(|err| match err {
        ResolveError::Store(store) => ApiError::from(store),
        other => ApiError::Internal(other.to_string()),
    })?;
    Ok(Json(user))
}

#[utoipa::path(
    put,
    path= "/v1/users/{id}/follow",
    params(("id" = i64, Path, description = "User to follow")),
    responses (
        (status = 204, description = "Now following"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Already following, or following oneself"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn follow_user(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.followers.follow(context.principal.id, id).await?;
    debug!(follower_id = context.principal.id, user_id = id, "follow recorded");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path= "/v1/users/{id}/unfollow",
    params(("id" = i64, Path, description = "User to unfollow")),
    responses (
        (status = 204, description = "No longer following"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 409, description = "Unfollowing oneself"),
    ),
    security(("bearer" = [])),
    tag= "users"
)]
#[instrument(skip_all)]
pub async fn unfollow_user(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.storage.followers.unfollow(context.principal.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
