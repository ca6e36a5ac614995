//! Keyspace layout of the key-value engine.
//!
//! | key                      | type       | content                          |
//! |--------------------------|------------|----------------------------------|
//! | `counter:<entity>`       | string     | last allocated id                |
//! | `post:<id>`              | hash       | owner_id, title, text, comments_allowed |
//! | `comment:<id>`           | hash       | owner_id, post_id, parent_id, text, created_at |
//! | `user:<id>`              | hash       | login, password_hash, password_salt |
//! | `posts`                  | sorted set | every post id, scored by id      |
//! | `post:<id>:comments`     | sorted set | top-level comment ids            |
//! | `comment:<id>:replies`   | sorted set | reply ids                        |
//! | `login:<login>`          | string     | user id                          |

use forum_types::models::CommentParent;

pub const POST_COUNTER: &str = "counter:post";
pub const COMMENT_COUNTER: &str = "counter:comment";
pub const USER_COUNTER: &str = "counter:user";

pub const ALL_POSTS: &str = "posts";

pub fn post(id: i64) -> String {
    format!("post:{}", id)
}

pub fn comment(id: i64) -> String {
    format!("comment:{}", id)
}

pub fn user(id: i64) -> String {
    format!("user:{}", id)
}

pub fn post_comments(post_id: i64) -> String {
    format!("post:{}:comments", post_id)
}

pub fn comment_replies(comment_id: i64) -> String {
    format!("comment:{}:replies", comment_id)
}

pub fn login(login: &str) -> String {
    format!("login:{}", login)
}

/// Record key of the entity a comment hangs under.
pub fn parent_record(parent: CommentParent) -> String {
    match parent {
        CommentParent::Post(id) => post(id),
        CommentParent::Comment(id) => comment(id),
    }
}

/// Listing a new comment is indexed under.
pub fn parent_listing(parent: CommentParent) -> String {
    match parent {
        CommentParent::Post(id) => post_comments(id),
        CommentParent::Comment(id) => comment_replies(id),
    }
}
