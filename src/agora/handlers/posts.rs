//! Posts. Mutating someone else's post takes `moderator` to edit and `admin`
//! to delete; owners may always do both.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    agora::{context::RequestContext, error::ApiError, state::AppState},
    store::{NewPost, Post, PostPatch},
};

pub const PATCH_ROLE: &str = "moderator";
pub const DELETE_ROLE: &str = "admin";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreatePostPayload {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct UpdatePostPayload {
    pub title: Option<String>,
    pub content: Option<String>,
}

async fn ensure_allowed(
    state: &AppState,
    context: &RequestContext,
    post: &Post,
    required_role: &str,
) -> Result<(), ApiError> {
    if state
        .authorizer
        .authorize(&context.principal, post.user_id, required_role)
        .await?
    {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[utoipa::path(
    post,
    path= "/v1/posts",
    request_body = CreatePostPayload,
    responses (
        (status = 201, description = "Post created", body = Post),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag= "posts"
)]
#[instrument(skip_all)]
pub async fn create_post(
    State(state): State<AppState>,
    context: RequestContext,
    Json(payload): Json<CreatePostPayload>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    state
        .validator
        .new_post(&payload.title, &payload.content)
        .map_err(ApiError::BadRequest)?;

    let post = state
        .storage
        .posts
        .create(NewPost {
            user_id: context.principal.id,
            title: payload.title,
            content: payload.content,
            tags: payload.tags,
        })
        .await?;

    info!(post_id = post.id, user_id = post.user_id, "post created");

    Ok((StatusCode::CREATED, Json(post)))
}

#[utoipa::path(
    get,
    path= "/v1/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses (
        (status = 200, description = "Post", body = Post),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Post not found"),
    ),
    security(("bearer" = [])),
    tag= "posts"
)]
#[instrument(skip_all)]
pub async fn get_post(
    State(state): State<AppState>,
    _context: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<Post>, ApiError> {
    Ok(Json(state.storage.posts.get_by_id(id).await?))
}

#[utoipa::path(
    patch,
    path= "/v1/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    request_body = UpdatePostPayload,
    responses (
        (status = 200, description = "Post updated", body = Post),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Not the owner and role below moderator"),
        (status = 404, description = "Post not found"),
    ),
    security(("bearer" = [])),
    tag= "posts"
)]
#[instrument(skip_all)]
pub async fn update_post(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePostPayload>,
) -> Result<Json<Post>, ApiError> {
    let post = state.storage.posts.get_by_id(id).await?;
    ensure_allowed(&state, &context, &post, PATCH_ROLE).await?;

    state
        .validator
        .post_patch(payload.title.as_deref(), payload.content.as_deref())
        .map_err(ApiError::BadRequest)?;

    let updated = state
        .storage
        .posts
        .update(
            id,
            PostPatch {
                title: payload.title,
                content: payload.content,
            },
        )
        .await?;

    info!(post_id = id, user_id = context.principal.id, "post updated");

    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path= "/v1/posts/{id}",
    params(("id" = i64, Path, description = "Post id")),
    responses (
        (status = 204, description = "Post deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Not the owner and role below admin"),
        (status = 404, description = "Post not found"),
    ),
    security(("bearer" = [])),
    tag= "posts"
)]
#[instrument(skip_all)]
pub async fn delete_post(
    State(state): State<AppState>,
    context: RequestContext,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let post = state.storage.posts.get_by_id(id).await?;
    ensure_allowed(&state, &context, &post, DELETE_ROLE).await?;

    state.storage.posts.delete(id).await?;

    info!(post_id = id, user_id = context.principal.id, "post deleted");

    Ok(StatusCode::NO_CONTENT)
}
