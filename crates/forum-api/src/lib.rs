pub mod auth;
pub mod comments;
pub mod error;
pub mod middleware;
pub mod posts;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tracing::warn;

use forum_crypto::TokenIssuer;
use forum_db::{Storage, StorageError};

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub storage: Storage,
    pub tokens: TokenIssuer,
    pub limits: Limits,
    /// Upper bound for every storage call made on behalf of a request.
    pub storage_timeout: Duration,
}

impl AppStateInner {
    /// Run a storage future, giving up once the deadline passes.
    pub async fn within_deadline<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Storage call exceeded {:?}", self.storage_timeout);
                Err(StorageError::Internal(anyhow!(
                    "storage call exceeded {:?}",
                    self.storage_timeout
                ))
                .into())
            }
        }
    }
}

/// Page size and input bounds applied by the handlers.
#[derive(Debug, Clone)]
pub struct Limits {
    pub default_posts: usize,
    pub max_posts: usize,
    pub default_comments: usize,
    pub max_comments: usize,
    pub max_comment_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_posts: 10,
            max_posts: 100,
            default_comments: 10,
            max_comments: 50,
            max_comment_length: 2000,
        }
    }
}

impl Limits {
    /// Absent → default, above max → max, below one → caller error.
    pub fn page_size(requested: Option<i64>, default: usize, max: usize) -> Result<usize, ApiError> {
        match requested {
            None => Ok(default.min(max)),
            Some(n) if n < 1 => Err(ApiError::BadRequest("limit must be at least 1".into())),
            Some(n) => Ok(usize::try_from(n).unwrap_or(max).min(max)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/{post_id}", get(posts::get_post))
        .route(
            "/posts/{post_id}/comments-allowed",
            put(posts::set_comments_allowed),
        )
        .route(
            "/posts/{post_id}/comments",
            get(comments::list_post_comments).post(comments::add_comment),
        )
        .route(
            "/comments/{comment_id}/replies",
            get(comments::list_replies).post(comments::add_reply),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::soft_auth,
        ))
        .with_state(state)
}
