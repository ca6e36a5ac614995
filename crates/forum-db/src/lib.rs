//! Storage layer for the forum.
//!
//! Three repository contracts ([`PostRepo`], [`CommentRepo`], [`UserRepo`])
//! and two engines that implement all of them: [`SqliteStore`] (relational)
//! and [`KvStore`] (hash records plus per-listing sorted sets). An engine is
//! picked once at startup and handed to consumers as a [`Storage`] bundle.
//!
//! Every list operation follows the same keyset pagination rule: items are
//! ordered by ascending id, only ids strictly greater than `after` qualify,
//! at most `limit` items are returned, and `has_next_page` reports whether
//! at least one more qualifying item exists.

pub mod kv;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use forum_types::models::{
    Comment, CommentId, NewComment, NewPost, NewUser, Post, PostId, PublicUser, UserCredentials,
    UserId,
};
use forum_types::pagination::Page;

pub use kv::{KvBackend, KvStore, MemoryBackend, RedisBackend};
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Store a post and return its id. Fails with `NotFound` if the owner
    /// does not exist.
    async fn add_post(&self, post: NewPost) -> Result<PostId>;
    async fn set_comments_allowed(&self, post_id: PostId, allowed: bool) -> Result<()>;
    async fn get_post_by_id(&self, post_id: PostId) -> Result<Post>;
    async fn list_posts(&self, limit: usize, after: PostId) -> Result<Page<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Store a comment and return its id. The creation time is assigned here.
    /// Fails with `NotFound` if the owner or the parent post/comment is absent.
    async fn add_comment(&self, comment: NewComment) -> Result<CommentId>;
    async fn get_comment_by_id(&self, comment_id: CommentId) -> Result<Comment>;
    /// Top-level comments of a post. Replies are never included.
    async fn list_comments_by_post(
        &self,
        post_id: PostId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>>;
    /// Direct replies of a comment, one level deep.
    async fn list_replies_by_comment(
        &self,
        comment_id: CommentId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` if the login is taken.
    async fn add_user(&self, user: NewUser) -> Result<UserId>;
    /// Public projection only; never carries password material.
    async fn get_user_by_id(&self, user_id: UserId) -> Result<PublicUser>;
    async fn get_user_by_login_with_credentials(&self, login: &str) -> Result<UserCredentials>;
}

/// The repositories of one engine, as held by request handlers.
#[derive(Clone)]
pub struct Storage {
    pub posts: Arc<dyn PostRepo>,
    pub comments: Arc<dyn CommentRepo>,
    pub users: Arc<dyn UserRepo>,
}

impl Storage {
    pub fn new<E>(engine: E) -> Self
    where
        E: PostRepo + CommentRepo + UserRepo + 'static,
    {
        let engine = Arc::new(engine);
        Self {
            posts: engine.clone(),
            comments: engine.clone(),
            users: engine,
        }
    }
}
