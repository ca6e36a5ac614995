//! Key-value engine: one hash per entity, one sorted set per listing, and
//! application-managed id counters.
//!
//! Writes are several independent commands. Referential checks (`EXISTS`)
//! run before the write and are not atomic with it. User registration claims
//! `login:<login>` with `SET NX` before writing the user hash; if that second
//! write fails the login stays claimed and resolves to `NotFound`. No
//! compensating action is taken.

mod backend;
pub mod keys;
mod memory;
mod redis_backend;

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use forum_types::models::{
    Comment, CommentId, CommentParent, NewComment, NewPost, NewUser, Post, PostId, PublicUser,
    UserCredentials, UserId,
};
use forum_types::pagination::{Page, fetch_count};

use crate::{CommentRepo, PostRepo, Result, StorageError, UserRepo};

pub use backend::KvBackend;
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;

pub struct KvStore<B> {
    backend: B,
}

impl<B: KvBackend> KvStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn require(&self, key: &str) -> Result<()> {
        if self.backend.exists(key).await? {
            Ok(())
        } else {
            debug!("kv: {} does not exist", key);
            Err(StorageError::NotFound)
        }
    }

    /// Ids of one window of a listing, trimmed to `limit`.
    async fn window(&self, listing: &str, limit: usize, after: i64) -> Result<Page<i64>> {
        let ids = self
            .backend
            .zrange_by_score_after(listing, after, fetch_count(limit))
            .await?;
        Ok(Page::from_overfetch(ids, limit))
    }

    /// Owner of a listed entity. A dangling owner reference is corrupt data,
    /// not a missing entity.
    async fn owner_of(&self, owner_id: UserId, entity: &str) -> Result<PublicUser> {
        match self.get_user_by_id(owner_id).await {
            Err(StorageError::NotFound) => Err(StorageError::Internal(anyhow!(
                "{} references missing owner {}",
                entity,
                owner_id
            ))),
            other => other,
        }
    }

    async fn list_comments(&self, listing: &str, limit: usize, after: i64) -> Result<Page<Comment>> {
        let window = self.window(listing, limit, after).await?;
        let mut items = Vec::with_capacity(window.items.len());
        for id in window.items {
            items.push(listed(self.get_comment_by_id(id).await, listing, id)?);
        }
        Ok(Page {
            items,
            has_next_page: window.has_next_page,
        })
    }
}

#[async_trait]
impl<B: KvBackend> PostRepo for KvStore<B> {
    async fn add_post(&self, post: NewPost) -> Result<PostId> {
        self.require(&keys::user(post.owner_id)).await?;

        let id = self.backend.incr(keys::POST_COUNTER).await?;
        self.backend
            .hset_multiple(
                &keys::post(id),
                &[
                    ("owner_id", post.owner_id.to_string()),
                    ("title", post.title),
                    ("text", post.text),
                    ("comments_allowed", encode_bool(post.comments_allowed)),
                ],
            )
            .await?;
        self.backend.zadd(keys::ALL_POSTS, id, id).await?;

        Ok(id)
    }

    async fn set_comments_allowed(&self, post_id: PostId, allowed: bool) -> Result<()> {
        let key = keys::post(post_id);
        self.require(&key).await?;
        self.backend
            .hset(&key, "comments_allowed", encode_bool(allowed))
            .await?;
        Ok(())
    }

    async fn get_post_by_id(&self, post_id: PostId) -> Result<Post> {
        let key = keys::post(post_id);
        let record = self.backend.hgetall(&key).await?;
        if record.is_empty() {
            return Err(StorageError::NotFound);
        }

        let owner_id: UserId = field(&record, &key, "owner_id")?;
        let comments_allowed = decode_bool(text_field(&record, &key, "comments_allowed")?)
            .ok_or_else(|| anyhow!("{} has a malformed comments_allowed", key))?;

        Ok(Post {
            id: post_id,
            owner: self.owner_of(owner_id, &key).await?,
            title: text_field(&record, &key, "title")?.to_string(),
            text: text_field(&record, &key, "text")?.to_string(),
            comments_allowed,
        })
    }

    async fn list_posts(&self, limit: usize, after: PostId) -> Result<Page<Post>> {
        let window = self.window(keys::ALL_POSTS, limit, after).await?;
        let mut items = Vec::with_capacity(window.items.len());
        for id in window.items {
            items.push(listed(self.get_post_by_id(id).await, keys::ALL_POSTS, id)?);
        }
        Ok(Page {
            items,
            has_next_page: window.has_next_page,
        })
    }
}

#[async_trait]
impl<B: KvBackend> CommentRepo for KvStore<B> {
    async fn add_comment(&self, comment: NewComment) -> Result<CommentId> {
        self.require(&keys::user(comment.owner_id)).await?;
        self.require(&keys::parent_record(comment.parent)).await?;

        let id = self.backend.incr(keys::COMMENT_COUNTER).await?;
        let (post_id, parent_id) = comment.parent.to_columns();
        self.backend
            .hset_multiple(
                &keys::comment(id),
                &[
                    ("owner_id", comment.owner_id.to_string()),
                    ("post_id", post_id.to_string()),
                    ("parent_id", parent_id.to_string()),
                    ("text", comment.text),
                    ("created_at", Utc::now().timestamp_millis().to_string()),
                ],
            )
            .await?;
        self.backend
            .zadd(&keys::parent_listing(comment.parent), id, id)
            .await?;

        Ok(id)
    }

    async fn get_comment_by_id(&self, comment_id: CommentId) -> Result<Comment> {
        let key = keys::comment(comment_id);
        let record = self.backend.hgetall(&key).await?;
        if record.is_empty() {
            return Err(StorageError::NotFound);
        }

        let owner_id: UserId = field(&record, &key, "owner_id")?;
        let parent = CommentParent::from_columns(
            field(&record, &key, "post_id")?,
            field(&record, &key, "parent_id")?,
        )
        .map_err(|e| anyhow!("{} has an invalid parent: {}", key, e))?;
        let created_ms: i64 = field(&record, &key, "created_at")?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
            .ok_or_else(|| anyhow!("{} has an out-of-range created_at", key))?;

        Ok(Comment {
            id: comment_id,
            owner: self.owner_of(owner_id, &key).await?,
            parent,
            text: text_field(&record, &key, "text")?.to_string(),
            created_at,
        })
    }

    async fn list_comments_by_post(
        &self,
        post_id: PostId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>> {
        self.list_comments(&keys::post_comments(post_id), limit, after)
            .await
    }

    async fn list_replies_by_comment(
        &self,
        comment_id: CommentId,
        limit: usize,
        after: CommentId,
    ) -> Result<Page<Comment>> {
        self.list_comments(&keys::comment_replies(comment_id), limit, after)
            .await
    }
}

#[async_trait]
impl<B: KvBackend> UserRepo for KvStore<B> {
    async fn add_user(&self, user: NewUser) -> Result<UserId> {
        let id = self.backend.incr(keys::USER_COUNTER).await?;

        if !self
            .backend
            .set_nx(&keys::login(&user.login), id.to_string())
            .await?
        {
            debug!("add_user: login {:?} already taken", user.login);
            return Err(StorageError::Conflict);
        }

        self.backend
            .hset_multiple(
                &keys::user(id),
                &[
                    ("login", user.login),
                    ("password_hash", user.password_hash),
                    ("password_salt", user.password_salt),
                ],
            )
            .await?;

        Ok(id)
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<PublicUser> {
        let key = keys::user(user_id);
        let record = self.backend.hgetall(&key).await?;
        if record.is_empty() {
            return Err(StorageError::NotFound);
        }

        Ok(PublicUser {
            id: user_id,
            login: text_field(&record, &key, "login")?.to_string(),
        })
    }

    async fn get_user_by_login_with_credentials(&self, login: &str) -> Result<UserCredentials> {
        let index_key = keys::login(login);
        let Some(raw_id) = self.backend.get(&index_key).await? else {
            return Err(StorageError::NotFound);
        };
        let user_id: UserId = raw_id
            .parse()
            .map_err(|_| anyhow!("{} holds a non-numeric id {:?}", index_key, raw_id))?;

        let key = keys::user(user_id);
        let record = self.backend.hgetall(&key).await?;
        if record.is_empty() {
            // Login claimed but the user record was never written
            return Err(StorageError::NotFound);
        }

        Ok(UserCredentials {
            id: user_id,
            login: text_field(&record, &key, "login")?.to_string(),
            password_hash: text_field(&record, &key, "password_hash")?.to_string(),
            password_salt: text_field(&record, &key, "password_salt")?.to_string(),
        })
    }
}

/// An id present in a listing must resolve to a record.
fn listed<T>(result: Result<T>, listing: &str, id: i64) -> Result<T> {
    match result {
        Err(StorageError::NotFound) => Err(StorageError::Internal(anyhow!(
            "{} lists {} but its record is missing",
            listing,
            id
        ))),
        other => other,
    }
}

fn text_field<'a>(record: &'a HashMap<String, String>, key: &str, name: &str) -> Result<&'a str> {
    record
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| StorageError::Internal(anyhow!("{} is missing field {}", key, name)))
}

fn field<T: FromStr>(record: &HashMap<String, String>, key: &str, name: &str) -> Result<T> {
    let raw = text_field(record, key, name)?;
    raw.parse()
        .map_err(|_| StorageError::Internal(anyhow!("{} has a malformed {}: {:?}", key, name, raw)))
}

fn encode_bool(value: bool) -> String {
    (if value { "1" } else { "0" }).to_string()
}

fn decode_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KvStore<MemoryBackend> {
        KvStore::new(MemoryBackend::new())
    }

    fn new_user(login: &str) -> NewUser {
        NewUser {
            login: login.into(),
            password_hash: "hash".into(),
            password_salt: "salt".into(),
        }
    }

    #[tokio::test]
    async fn layout_matches_keyspace() {
        let kv = store();
        let owner = kv.add_user(new_user("alice")).await.unwrap();
        let post = kv
            .add_post(NewPost {
                owner_id: owner,
                title: "t".into(),
                text: "b".into(),
                comments_allowed: false,
            })
            .await
            .unwrap();
        let top = kv
            .add_comment(NewComment {
                owner_id: owner,
                parent: CommentParent::Post(post),
                text: "c".into(),
            })
            .await
            .unwrap();
        let reply = kv
            .add_comment(NewComment {
                owner_id: owner,
                parent: CommentParent::Comment(top),
                text: "r".into(),
            })
            .await
            .unwrap();

        let backend = kv.backend();
        assert_eq!(backend.get("counter:user").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get("counter:comment").await.unwrap().as_deref(), Some("2"));
        assert_eq!(backend.get("login:alice").await.unwrap(), Some(owner.to_string()));

        let post_hash = backend.hgetall("post:1").await.unwrap();
        assert_eq!(post_hash["owner_id"], owner.to_string());
        assert_eq!(post_hash["comments_allowed"], "0");
        assert!(!post_hash.contains_key("login"));

        let reply_hash = backend.hgetall(&format!("comment:{}", reply)).await.unwrap();
        assert_eq!(reply_hash["post_id"], "0");
        assert_eq!(reply_hash["parent_id"], top.to_string());

        assert_eq!(backend.zrange_by_score_after("posts", 0, 10).await.unwrap(), vec![post]);
        assert_eq!(
            backend.zrange_by_score_after("post:1:comments", 0, 10).await.unwrap(),
            vec![top]
        );
        assert_eq!(
            backend
                .zrange_by_score_after(&format!("comment:{}:replies", top), 0, 10)
                .await
                .unwrap(),
            vec![reply]
        );
    }

    #[tokio::test]
    async fn duplicate_login_is_conflict_and_burns_an_id() {
        let kv = store();
        let first = kv.add_user(new_user("alice")).await.unwrap();
        assert!(matches!(
            kv.add_user(new_user("alice")).await,
            Err(StorageError::Conflict)
        ));

        let second = kv.add_user(new_user("bob")).await.unwrap();
        assert_eq!(second, first + 2);
        assert_eq!(
            kv.get_user_by_login_with_credentials("alice").await.unwrap().id,
            first
        );
    }

    #[tokio::test]
    async fn claimed_login_without_record_is_not_found() {
        let kv = store();
        kv.backend().set_nx("login:ghost", "7".into()).await.unwrap();
        assert!(matches!(
            kv.get_user_by_login_with_credentials("ghost").await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn owner_is_refetched_on_read() {
        let kv = store();
        let owner = kv.add_user(new_user("alice")).await.unwrap();
        let post = kv
            .add_post(NewPost {
                owner_id: owner,
                title: "t".into(),
                text: "b".into(),
                comments_allowed: true,
            })
            .await
            .unwrap();

        kv.backend()
            .hset(&keys::user(owner), "login", "alice2".into())
            .await
            .unwrap();
        assert_eq!(kv.get_post_by_id(post).await.unwrap().owner.login, "alice2");
    }

    #[tokio::test]
    async fn corrupt_records_are_internal_errors() {
        let kv = store();
        kv.backend()
            .hset_multiple("post:9", &[("owner_id", "x".into())])
            .await
            .unwrap();
        assert!(matches!(kv.get_post_by_id(9).await, Err(StorageError::Internal(_))));

        kv.backend().zadd(keys::ALL_POSTS, 12, 12).await.unwrap();
        assert!(matches!(kv.list_posts(10, 9).await, Err(StorageError::Internal(_))));
    }

    #[tokio::test]
    async fn missing_references_are_not_found() {
        let kv = store();
        assert!(matches!(
            kv.add_post(NewPost {
                owner_id: 1,
                title: "t".into(),
                text: "b".into(),
                comments_allowed: true,
            })
            .await,
            Err(StorageError::NotFound)
        ));
        assert!(matches!(
            kv.set_comments_allowed(1, false).await,
            Err(StorageError::NotFound)
        ));

        let owner = kv.add_user(new_user("alice")).await.unwrap();
        assert!(matches!(
            kv.add_comment(NewComment {
                owner_id: owner,
                parent: CommentParent::Comment(5),
                text: "r".into(),
            })
            .await,
            Err(StorageError::NotFound)
        ));
        // Nothing was allocated for the rejected comment
        assert_eq!(kv.backend().get(keys::COMMENT_COUNTER).await.unwrap(), None);
    }
}
