use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use forum_types::api::{CommentResponse, Connection, CreateCommentRequest, ListQuery};
use forum_types::models::{Comment, CommentId, CommentParent, NewComment, PostId};
use forum_types::pagination::parse_cursor;

use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, Limits};

fn list_window(state: &AppState, query: &ListQuery) -> Result<(usize, i64), ApiError> {
    let limit = Limits::page_size(
        query.limit,
        state.limits.default_comments,
        state.limits.max_comments,
    )?;
    let after = parse_cursor(query.after.as_deref()).map_err(|e| {
        debug!("Rejecting comments cursor: {}", e);
        ApiError::BadRequest(e.to_string())
    })?;
    Ok((limit, after))
}

fn post_parent(post_id: PostId) -> Result<CommentParent, ApiError> {
    CommentParent::from_columns(post_id, 0).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn reply_parent(comment_id: CommentId) -> Result<CommentParent, ApiError> {
    CommentParent::from_columns(0, comment_id).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn validate_text(state: &AppState, text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest("comment text cannot be empty".into()));
    }
    let max = state.limits.max_comment_length;
    // Measured in UTF-8 bytes
    if text.len() > max {
        return Err(ApiError::BadRequest(format!(
            "comment text exceeds {} bytes",
            max
        )));
    }
    Ok(())
}

/// Store a comment and read it back so the response carries the stored
/// timestamp.
async fn create(
    state: &AppState,
    owner_id: i64,
    parent: CommentParent,
    text: String,
    missing: &'static str,
) -> Result<Comment, ApiError> {
    let id = state
        .within_deadline(state.storage.comments.add_comment(NewComment {
            owner_id,
            parent,
            text,
        }))
        .await
        .map_err(|e| ApiError::from_storage(e, missing))?;

    state
        .within_deadline(state.storage.comments.get_comment_by_id(id))
        .await
        .map_err(|e| ApiError::from_storage(e, "comment not found"))
}

/// Top-level comments of a post, oldest first.
pub async fn list_post_comments(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Connection<CommentResponse>>, ApiError> {
    post_parent(post_id)?;
    let (limit, after) = list_window(&state, &query)?;

    let page = state
        .within_deadline(
            state
                .storage
                .comments
                .list_comments_by_post(post_id, limit, after),
        )
        .await
        .map_err(|e| ApiError::from_storage(e, "post not found"))?;

    Ok(Json(Connection::from_page(page, |c: &Comment| c.id)))
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<PostId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = identity.require()?;
    let parent = post_parent(post_id)?;
    validate_text(&state, &req.text)?;

    let post = state
        .within_deadline(state.storage.posts.get_post_by_id(post_id))
        .await
        .map_err(|e| ApiError::from_storage(e, "post not found"))?;
    if !post.comments_allowed {
        debug!("Comments are disabled on post {}", post.id);
        return Err(ApiError::Forbidden("comments are disabled for this post"));
    }

    let comment = create(&state, user.id, parent, req.text, "post not found").await?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

/// Direct replies to a comment, oldest first.
pub async fn list_replies(
    State(state): State<AppState>,
    Path(comment_id): Path<CommentId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Connection<CommentResponse>>, ApiError> {
    reply_parent(comment_id)?;
    let (limit, after) = list_window(&state, &query)?;

    let page = state
        .within_deadline(
            state
                .storage
                .comments
                .list_replies_by_comment(comment_id, limit, after),
        )
        .await
        .map_err(|e| ApiError::from_storage(e, "comment not found"))?;

    Ok(Json(Connection::from_page(page, |c: &Comment| c.id)))
}

pub async fn add_reply(
    State(state): State<AppState>,
    Path(comment_id): Path<CommentId>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = identity.require()?;
    let parent = reply_parent(comment_id)?;
    validate_text(&state, &req.text)?;

    let comment = create(&state, user.id, parent, req.text, "comment not found").await?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}
