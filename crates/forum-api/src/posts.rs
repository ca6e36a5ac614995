use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use forum_types::api::{
    Connection, CreatePostRequest, ListQuery, PostResponse, SetCommentsAllowedRequest,
};
use forum_types::models::{NewPost, Post, PostId};
use forum_types::pagination::parse_cursor;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, Limits};

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Connection<PostResponse>>, ApiError> {
    let limit = Limits::page_size(query.limit, state.limits.default_posts, state.limits.max_posts)?;
    let after = parse_cursor(query.after.as_deref()).map_err(|e| {
        debug!("Rejecting posts cursor: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;

    let page = state
        .within_deadline(state.storage.posts.list_posts(limit, after))
        .await
        .map_err(|e| ApiError::from_storage(e, "posts not found"))?;

    Ok(Json(Connection::from_page(page, |post: &Post| post.id)))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = identity.require()?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }

    let id = state
        .within_deadline(state.storage.posts.add_post(NewPost {
            owner_id: owner.id,
            title: req.title.clone(),
            text: req.text.clone(),
            comments_allowed: req.comments_allowed,
        }))
        .await
        .map_err(|e| ApiError::from_storage(e, "user not found"))?;

    let post = Post {
        id,
        owner: owner.clone(),
        title: req.title,
        text: req.text,
        comments_allowed: req.comments_allowed,
    };
    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .within_deadline(state.storage.posts.get_post_by_id(post_id))
        .await
        .map_err(|e| ApiError::from_storage(e, "post not found"))?;

    Ok(Json(post.into()))
}

/// Only the owner may toggle comments on a post.
pub async fn set_comments_allowed(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SetCommentsAllowedRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let user = identity.require()?;

    let mut post = state
        .within_deadline(state.storage.posts.get_post_by_id(post_id))
        .await
        .map_err(|e| ApiError::from_storage(e, "post not found"))?;

    if post.owner.id != user.id {
        debug!(
            "User {} tried to modify post {} owned by {}",
            user.id, post.id, post.owner.id
        );
        return Err(ApiError::Forbidden("cannot modify this post"));
    }

    state
        .within_deadline(state.storage.posts.set_comments_allowed(post_id, req.allowed))
        .await
        .map_err(|e| ApiError::from_storage(e, "post not found"))?;

    post.comments_allowed = req.allowed;
    Ok(Json(post.into()))
}
