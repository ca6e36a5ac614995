use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::debug;

use forum_types::models::{
    Comment, CommentId, NewComment, NewPost, NewUser, Post, PostId, PublicUser, UserCredentials,
    UserId,
};
use forum_types::pagination::{Page, fetch_count};

use super::SqliteStore;
use super::models::{COMMENT_COLUMNS, CommentRow, POST_COLUMNS, PostRow};
use crate::{CommentRepo, PostRepo, Result, StorageError, UserRepo};

#[async_trait]
impl PostRepo for SqliteStore {
    async fn add_post(&self, post: NewPost) -> Result<PostId> {
        self.with_conn(move |conn| {
            // Owner check and insert in one statement
            let inserted = conn.execute(
                "INSERT INTO posts (owner_id, title, text, comments_allowed)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)",
                params![post.owner_id, post.title, post.text, post.comments_allowed],
            )?;
            if inserted == 0 {
                debug!("add_post: owner {} does not exist", post.owner_id);
                return Err(StorageError::NotFound);
            }
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn set_comments_allowed(&self, post_id: PostId, allowed: bool) -> Result<()> {
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE posts SET comments_allowed = ?1 WHERE id = ?2",
                params![allowed, post_id],
            )?;
            if updated == 0 {
                return Err(StorageError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn get_post_by_id(&self, post_id: PostId) -> Result<Post> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.owner_id = u.id
                 WHERE p.id = ?1"
            );
            let row = conn.query_row(&sql, [post_id], PostRow::from_row)?;
            Ok(row.into())
        })
        .await
    }

    async fn list_posts(&self, limit: usize, after: PostId) -> Result<Page<Post>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS}
                 FROM posts p
                 JOIN users u ON p.owner_id = u.id
                 WHERE p.id > ?1
                 ORDER BY p.id
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt
                .query_map(params![after, sql_limit(limit)], PostRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Page::from_overfetch(rows, limit).map(Post::from))
        })
        .await
    }
}

#[async_trait]
impl CommentRepo for SqliteStore {
    async fn add_comment(&self, comment: NewComment) -> Result<CommentId> {
        let (post_id, parent_id) = comment.parent.to_columns();

        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO comments (owner_id, post_id, parent_id, text)
                 SELECT ?1, ?2, ?3, ?4
                 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)
                   AND (
                        (?3 = 0 AND EXISTS (SELECT 1 FROM posts WHERE id = ?2))
                     OR (?3 <> 0 AND EXISTS (SELECT 1 FROM comments WHERE id = ?3))
                   )",
                params![comment.owner_id, post_id, parent_id, comment.text],
            )?;
            if inserted == 0 {
                debug!(
                    "add_comment: owner {} or parent {:?} does not exist",
                    comment.owner_id, comment.parent
                );
                return Err(StorageError::NotFound);
            }
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get_comment_by_id(&self, comment_id: CommentId) -> Result<Comment> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {COMMENT_COLUMNS}
                 FROM comments c
                 JOIN users u ON c.owner_id = u.id
                 WHERE c.id = ?1"
            );
            let row = conn.query_row(&sql, [comment_id], CommentRow::from_row)?;
            row.try_into()
        })
        .await
    }

    async fn list_comments_by_post(
        &self,
        post_id: PostId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>> {
        self.with_conn(move |conn| {
            query_comments(conn, "c.parent_id = 0 AND c.post_id = ?1", post_id, after, limit)
        })
        .await
    }

    async fn list_replies_by_comment(
        &self,
        comment_id: CommentId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>> {
        self.with_conn(move |conn| {
            query_comments(conn, "c.parent_id = ?1", comment_id, after, limit)
        })
        .await
    }
}

#[async_trait]
impl UserRepo for SqliteStore {
    async fn add_user(&self, user: NewUser) -> Result<UserId> {
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO users (login, password_hash, password_salt) VALUES (?1, ?2, ?3)",
                params![user.login, user.password_hash, user.password_salt],
            );
            match result {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(e) if is_unique_violation(&e) => {
                    debug!("add_user: login {:?} already taken", user.login);
                    Err(StorageError::Conflict)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<PublicUser> {
        self.with_conn(move |conn| {
            let user = conn.query_row(
                "SELECT id, login FROM users WHERE id = ?1",
                [user_id],
                |row| {
                    Ok(PublicUser {
                        id: row.get(0)?,
                        login: row.get(1)?,
                    })
                },
            )?;
            Ok(user)
        })
        .await
    }

    async fn get_user_by_login_with_credentials(&self, login: &str) -> Result<UserCredentials> {
        let login = login.to_string();
        self.with_conn(move |conn| {
            let user = conn.query_row(
                "SELECT id, login, password_hash, password_salt FROM users WHERE login = ?1",
                [&login],
                |row| {
                    Ok(UserCredentials {
                        id: row.get(0)?,
                        login: row.get(1)?,
                        password_hash: row.get(2)?,
                        password_salt: row.get(3)?,
                    })
                },
            )?;
            Ok(user)
        })
        .await
    }
}

/// One level of the comment tree: `scope` narrows by `?1`, then the shared
/// keyset window applies.
fn query_comments(
    conn: &Connection,
    scope: &str,
    scope_id: i64,
    after: CommentId,
    limit: usize,
) -> Result<Page<Comment>> {
    let sql = format!(
        "SELECT {COMMENT_COLUMNS}
         FROM comments c
         JOIN users u ON c.owner_id = u.id
         WHERE {scope} AND c.id > ?2
         ORDER BY c.id
         LIMIT ?3"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![scope_id, after, sql_limit(limit)], CommentRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let page = Page::from_overfetch(rows, limit);
    let items = page
        .items
        .into_iter()
        .map(Comment::try_from)
        .collect::<Result<Vec<_>>>()?;

    Ok(Page {
        items,
        has_next_page: page.has_next_page,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(fetch_count(limit)).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
