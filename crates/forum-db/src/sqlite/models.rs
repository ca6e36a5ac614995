/// Database row types. These map directly to SQLite rows and are converted
/// into the shared entity model at the engine boundary.
use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Row;

use forum_types::models::{Comment, CommentParent, Post, PublicUser};

use crate::StorageError;

/// Column list shared by every post query (owner joined as `u`).
pub const POST_COLUMNS: &str = "p.id, p.title, p.text, p.comments_allowed, u.id, u.login";

/// Column list shared by every comment query (owner joined as `u`).
pub const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.parent_id, c.text, c.created_at, u.id, u.login";

pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub comments_allowed: bool,
    pub owner_id: i64,
    pub owner_login: String,
}

impl PostRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            text: row.get(2)?,
            comments_allowed: row.get(3)?,
            owner_id: row.get(4)?,
            owner_login: row.get(5)?,
        })
    }
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            owner: PublicUser {
                id: row.owner_id,
                login: row.owner_login,
            },
            title: row.title,
            text: row.text,
            comments_allowed: row.comments_allowed,
        }
    }
}

pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub parent_id: i64,
    pub text: String,
    pub created_at: String,
    pub owner_id: i64,
    pub owner_login: String,
}

impl CommentRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            post_id: row.get(1)?,
            parent_id: row.get(2)?,
            text: row.get(3)?,
            created_at: row.get(4)?,
            owner_id: row.get(5)?,
            owner_login: row.get(6)?,
        })
    }
}

impl TryFrom<CommentRow> for Comment {
    type Error = StorageError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let parent = CommentParent::from_columns(row.post_id, row.parent_id)
            .map_err(|e| anyhow!("comment {} has an invalid parent: {}", row.id, e))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .with_context(|| format!("comment {} has a corrupt created_at", row.id))?
            .with_timezone(&Utc);

        Ok(Comment {
            id: row.id,
            owner: PublicUser {
                id: row.owner_id,
                login: row.owner_login,
            },
            parent,
            text: row.text,
            created_at,
        })
    }
}
