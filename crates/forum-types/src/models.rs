use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = i64;
pub type PostId = i64;
pub type CommentId = i64;

/// The only user shape that leaves the credential-check path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub login: String,
}

/// Stored user including password material. Returned only by the
/// login lookup.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
    pub password_salt: String,
}

impl UserCredentials {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            login: self.login.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub login: String,
    pub password_hash: String,
    pub password_salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub owner: PublicUser,
    pub title: String,
    pub text: String,
    pub comments_allowed: bool,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub owner_id: UserId,
    pub title: String,
    pub text: String,
    pub comments_allowed: bool,
}

/// Where a comment hangs in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CommentParent {
    /// Top-level comment directly under a post.
    Post(PostId),
    /// Reply to another comment.
    Comment(CommentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidParent {
    #[error("comment has neither a post nor a parent comment")]
    Missing,
    #[error("comment cannot have both a post ({post_id}) and a parent comment ({parent_id})")]
    Both { post_id: i64, parent_id: i64 },
    #[error("negative id in comment parent")]
    Negative,
}

impl CommentParent {
    /// Decode the two zero-able storage columns. Exactly one must be non-zero.
    pub fn from_columns(post_id: i64, parent_id: i64) -> Result<Self, InvalidParent> {
        if post_id < 0 || parent_id < 0 {
            return Err(InvalidParent::Negative);
        }
        match (post_id, parent_id) {
            (0, 0) => Err(InvalidParent::Missing),
            (post_id, 0) => Ok(Self::Post(post_id)),
            (0, parent_id) => Ok(Self::Comment(parent_id)),
            (post_id, parent_id) => Err(InvalidParent::Both { post_id, parent_id }),
        }
    }

    /// `(post_id, parent_id)` as persisted.
    pub fn to_columns(self) -> (i64, i64) {
        match self {
            Self::Post(id) => (id, 0),
            Self::Comment(id) => (0, id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub owner: PublicUser,
    pub parent: CommentParent,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A comment about to be stored. The creation time is assigned by the
/// storage engine.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub owner_id: UserId,
    pub parent: CommentParent,
    pub text: String,
}
