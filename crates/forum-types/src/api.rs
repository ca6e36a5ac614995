use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Comment, CommentParent, Post, PublicUser, UserId};
use crate::pagination::Page;

// -- Token claims --

/// Signed token payload. `sub` carries the numeric user id as a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: UserId,
    pub token: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub text: String,
    #[serde(default = "default_comments_allowed")]
    pub comments_allowed: bool,
}

fn default_comments_allowed() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetCommentsAllowedRequest {
    pub allowed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub login: String,
}

impl From<PublicUser> for UserResponse {
    fn from(user: PublicUser) -> Self {
        Self {
            id: user.id,
            login: user.login,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: i64,
    pub owner: UserResponse,
    pub title: String,
    pub text: String,
    pub comments_allowed: bool,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            owner: post.owner.into(),
            title: post.title,
            text: post.text,
            comments_allowed: post.comments_allowed,
        }
    }
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub owner: UserResponse,
    pub parent: CommentParent,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            owner: comment.owner.into(),
            parent: comment.parent,
            text: comment.text,
            created_at: comment.created_at,
        }
    }
}

// -- Connections --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub after: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PageInfo {
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Connection<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    /// Wrap a page, using each node's id as its cursor.
    pub fn from_page<S>(page: Page<S>, id_of: impl Fn(&S) -> i64) -> Self
    where
        T: From<S>,
    {
        let edges: Vec<Edge<T>> = page
            .items
            .into_iter()
            .map(|item| Edge {
                cursor: id_of(&item).to_string(),
                node: T::from(item),
            })
            .collect();

        let page_info = PageInfo {
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
            has_next_page: page.has_next_page,
        };

        Self { edges, page_info }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
