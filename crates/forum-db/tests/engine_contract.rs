//! Behaviour every engine must share. Each test runs against the relational
//! engine and the key-value engine and, where outputs are observable,
//! compares them.

use forum_db::{KvBackend, KvStore, MemoryBackend, RedisBackend, SqliteStore, Storage, StorageError};
use forum_types::models::{CommentParent, NewComment, NewPost, NewUser, UserId};

fn engines() -> Vec<(&'static str, Storage)> {
    vec![
        ("sqlite", Storage::new(SqliteStore::open_in_memory().unwrap())),
        ("kv", Storage::new(KvStore::new(MemoryBackend::new()))),
    ]
}

async fn register(storage: &Storage, login: &str) -> UserId {
    storage
        .users
        .add_user(NewUser {
            login: login.into(),
            password_hash: format!("hash-{}", login),
            password_salt: format!("salt-{}", login),
        })
        .await
        .unwrap()
}

async fn post(storage: &Storage, owner_id: UserId, title: &str) -> i64 {
    storage
        .posts
        .add_post(NewPost {
            owner_id,
            title: title.into(),
            text: format!("{} body", title),
            comments_allowed: true,
        })
        .await
        .unwrap()
}

async fn comment(storage: &Storage, owner_id: UserId, parent: CommentParent, text: &str) -> i64 {
    storage
        .comments
        .add_comment(NewComment {
            owner_id,
            parent,
            text: text.into(),
        })
        .await
        .unwrap()
}

/// Observable output of the threaded-comment walkthrough, with ids replaced
/// by the texts they point at so engines can be compared.
#[derive(Debug, PartialEq)]
struct Walkthrough {
    pages: Vec<(Vec<String>, bool)>,
    replies: (Vec<String>, bool),
}

async fn walkthrough(storage: &Storage) -> Walkthrough {
    let author = register(storage, "author").await;
    let reader = register(storage, "reader").await;
    let p = post(storage, author, "P").await;
    assert!(storage.posts.get_post_by_id(p).await.unwrap().comments_allowed);

    let mut c = Vec::new();
    for i in 1..=5 {
        c.push(comment(storage, reader, CommentParent::Post(p), &format!("C{}", i)).await);
    }
    comment(storage, author, CommentParent::Comment(c[2]), "R1").await;

    let texts = |page: forum_types::pagination::Page<forum_types::models::Comment>| {
        (
            page.items.into_iter().map(|c| c.text).collect::<Vec<_>>(),
            page.has_next_page,
        )
    };

    let first = storage.comments.list_comments_by_post(p, 2, 0).await.unwrap();
    let second = storage.comments.list_comments_by_post(p, 2, c[1]).await.unwrap();
    let third = storage.comments.list_comments_by_post(p, 2, c[3]).await.unwrap();
    let replies = storage.comments.list_replies_by_comment(c[2], 10, 0).await.unwrap();

    Walkthrough {
        pages: vec![texts(first), texts(second), texts(third)],
        replies: texts(replies),
    }
}

#[tokio::test]
async fn threaded_comment_walkthrough_matches_across_engines() {
    let mut outputs = Vec::new();
    for (name, storage) in engines() {
        let out = walkthrough(&storage).await;
        assert_eq!(
            out.pages,
            vec![
                (vec!["C1".to_string(), "C2".to_string()], true),
                (vec!["C3".to_string(), "C4".to_string()], true),
                (vec!["C5".to_string()], false),
            ],
            "{}",
            name
        );
        assert_eq!(out.replies, (vec!["R1".to_string()], false), "{}", name);
        outputs.push(out);
    }
    assert_eq!(outputs[0], outputs[1]);
}

async fn paging_scenario(name: &str, storage: &Storage) {
    let owner = register(storage, "owner").await;
    let mut expected = Vec::new();
    for i in 0..7 {
        expected.push(post(storage, owner, &format!("post {}", i)).await);
    }

    for limit in [1usize, 2, 3, 7, 10] {
        let mut seen = Vec::new();
        let mut after = 0;
        let mut calls = 0;
        loop {
            let page = storage.posts.list_posts(limit, after).await.unwrap();
            calls += 1;
            assert!(page.items.len() <= limit, "{} limit {}", name, limit);
            seen.extend(page.items.iter().map(|p| p.id));
            match page.items.last() {
                Some(last) if page.has_next_page => after = last.id,
                _ => {
                    assert!(!page.has_next_page, "{} limit {}", name, limit);
                    break;
                }
            }
        }
        assert_eq!(seen, expected, "{} limit {}", name, limit);
        assert_eq!(calls, expected.len().div_ceil(limit), "{} limit {}", name, limit);
    }
}

#[tokio::test]
async fn paging_through_posts_returns_each_item_once() {
    for (name, storage) in engines() {
        paging_scenario(name, &storage).await;
    }
}

#[tokio::test]
async fn cursor_item_is_never_returned_again() {
    for (name, storage) in engines() {
        let owner = register(&storage, "owner").await;
        let p = post(&storage, owner, "P").await;
        let top = comment(&storage, owner, CommentParent::Post(p), "top").await;
        let mut replies = Vec::new();
        for i in 0..4 {
            replies.push(comment(&storage, owner, CommentParent::Comment(top), &format!("r{}", i)).await);
        }

        for (i, cursor) in replies.iter().enumerate() {
            let page = storage
                .comments
                .list_replies_by_comment(top, 10, *cursor)
                .await
                .unwrap();
            let ids: Vec<i64> = page.items.iter().map(|c| c.id).collect();
            assert!(!ids.contains(cursor), "{}", name);
            assert_eq!(ids, replies[i + 1..].to_vec(), "{}", name);
            assert!(!page.has_next_page, "{}", name);
        }
    }
}

#[tokio::test]
async fn listings_do_not_mix_levels_or_posts() {
    for (name, storage) in engines() {
        let owner = register(&storage, "owner").await;
        let p1 = post(&storage, owner, "P1").await;
        let p2 = post(&storage, owner, "P2").await;

        let a = comment(&storage, owner, CommentParent::Post(p1), "a").await;
        let b = comment(&storage, owner, CommentParent::Post(p2), "b").await;
        let a_reply = comment(&storage, owner, CommentParent::Comment(a), "a.1").await;
        let nested = comment(&storage, owner, CommentParent::Comment(a_reply), "a.1.1").await;

        let ids = |page: forum_types::pagination::Page<forum_types::models::Comment>| {
            page.items.into_iter().map(|c| c.id).collect::<Vec<_>>()
        };

        let p1_top = storage.comments.list_comments_by_post(p1, 10, 0).await.unwrap();
        assert_eq!(ids(p1_top), vec![a], "{}", name);
        let p2_top = storage.comments.list_comments_by_post(p2, 10, 0).await.unwrap();
        assert_eq!(ids(p2_top), vec![b], "{}", name);
        let a_children = storage.comments.list_replies_by_comment(a, 10, 0).await.unwrap();
        assert_eq!(ids(a_children), vec![a_reply], "{}", name);
        let deeper = storage.comments.list_replies_by_comment(a_reply, 10, 0).await.unwrap();
        assert_eq!(ids(deeper), vec![nested], "{}", name);

        let empty = storage.comments.list_replies_by_comment(b, 10, 0).await.unwrap();
        assert!(empty.items.is_empty() && !empty.has_next_page, "{}", name);

        let reply = storage.comments.get_comment_by_id(nested).await.unwrap();
        assert_eq!(reply.parent, CommentParent::Comment(a_reply), "{}", name);
        assert_eq!(reply.owner.login, "owner", "{}", name);
    }
}

async fn error_kinds_scenario(name: &str, storage: &Storage) {
    let owner = register(storage, "alice").await;

    assert!(
        matches!(
            storage
                .users
                .add_user(NewUser {
                    login: "alice".into(),
                    password_hash: "h".into(),
                    password_salt: "s".into(),
                })
                .await,
            Err(StorageError::Conflict)
        ),
        "{}",
        name
    );
    assert!(matches!(storage.users.get_user_by_id(owner + 100).await, Err(StorageError::NotFound)), "{}", name);
    assert!(matches!(storage.posts.get_post_by_id(1000).await, Err(StorageError::NotFound)), "{}", name);
    assert!(matches!(storage.posts.set_comments_allowed(1000, false).await, Err(StorageError::NotFound)), "{}", name);
    assert!(matches!(storage.comments.get_comment_by_id(1000).await, Err(StorageError::NotFound)), "{}", name);
    assert!(
        matches!(
            storage.users.get_user_by_login_with_credentials("nobody").await,
            Err(StorageError::NotFound)
        ),
        "{}",
        name
    );

    let creds = storage.users.get_user_by_login_with_credentials("alice").await.unwrap();
    assert_eq!(creds.id, owner, "{}", name);
    assert_eq!(creds.password_salt, "salt-alice", "{}", name);
}

#[tokio::test]
async fn error_kinds_match_across_engines() {
    for (name, storage) in engines() {
        error_kinds_scenario(name, &storage).await;
    }
}

#[tokio::test]
async fn comments_flag_toggles_on_both_engines() {
    for (name, storage) in engines() {
        let owner = register(&storage, "owner").await;
        let p = post(&storage, owner, "P").await;

        storage.posts.set_comments_allowed(p, false).await.unwrap();
        assert!(!storage.posts.get_post_by_id(p).await.unwrap().comments_allowed, "{}", name);

        storage.posts.set_comments_allowed(p, true).await.unwrap();
        let post = storage.posts.get_post_by_id(p).await.unwrap();
        assert!(post.comments_allowed, "{}", name);
        assert_eq!(post.owner.login, "owner", "{}", name);
        assert_eq!(post.title, "P", "{}", name);
    }
}

#[tokio::test]
async fn concurrent_writers_get_distinct_ids() {
    for (name, storage) in engines() {
        let owner = register(&storage, "owner").await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .posts
                    .add_post(NewPost {
                        owner_id: owner,
                        title: format!("t{}", i),
                        text: String::new(),
                        comments_allowed: true,
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16, "{}", name);

        let page = storage.posts.list_posts(100, 0).await.unwrap();
        let listed: Vec<i64> = page.items.iter().map(|p| p.id).collect();
        assert_eq!(listed, ids, "{}", name);
    }
}

/// Empty a Redis database so each scenario starts from fresh counters.
async fn flush_redis(url: &str) {
    let client = redis::Client::open(url).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    redis::cmd("FLUSHDB")
        .query_async::<_, ()>(&mut conn)
        .await
        .unwrap();
}

async fn redis_store(url: &str) -> KvStore<RedisBackend> {
    flush_redis(url).await;
    KvStore::new(RedisBackend::connect(url).await.unwrap())
}

// Flushes the target database. Run with:
// FORUM_TEST_REDIS_URL=redis://127.0.0.1:6379/15 cargo test -p forum-db -- --ignored
#[tokio::test]
#[ignore] // Requires Redis server
async fn redis_engine_matches_embedded_backend() {
    let Ok(url) = std::env::var("FORUM_TEST_REDIS_URL") else {
        eprintln!("FORUM_TEST_REDIS_URL not set, skipping");
        return;
    };

    // Raw primitives the key-value engine depends on
    let kv = redis_store(&url).await;
    let backend = kv.backend();
    assert!(backend.hgetall("post:404").await.unwrap().is_empty());
    assert!(!backend.exists("post:404").await.unwrap());
    assert!(backend.set_nx("login:claimed", "1".into()).await.unwrap());
    assert!(!backend.set_nx("login:claimed", "2".into()).await.unwrap());
    assert_eq!(backend.get("login:claimed").await.unwrap().as_deref(), Some("1"));
    // Members differ from scores so a swapped argument order shows up
    for (member, score) in [(30, 3), (10, 1), (20, 2)] {
        backend.zadd("listing", member, score).await.unwrap();
    }
    assert_eq!(backend.zrange_by_score_after("listing", 0, 10).await.unwrap(), vec![10, 20, 30]);
    assert_eq!(backend.zrange_by_score_after("listing", 1, 10).await.unwrap(), vec![20, 30]);
    assert_eq!(backend.zrange_by_score_after("listing", 1, 1).await.unwrap(), vec![20]);
    assert!(backend.zrange_by_score_after("listing", 3, 10).await.unwrap().is_empty());

    let on_redis = walkthrough(&Storage::new(redis_store(&url).await)).await;
    let embedded = walkthrough(&Storage::new(KvStore::new(MemoryBackend::new()))).await;
    assert_eq!(on_redis, embedded);

    paging_scenario("redis", &Storage::new(redis_store(&url).await)).await;
    error_kinds_scenario("redis", &Storage::new(redis_store(&url).await)).await;

    // A lost login race still burns the counter value
    let kv = redis_store(&url).await;
    let storage = Storage::new(kv);
    let first = register(&storage, "alice").await;
    assert!(matches!(
        storage
            .users
            .add_user(NewUser {
                login: "alice".into(),
                password_hash: "h".into(),
                password_salt: "s".into(),
            })
            .await,
        Err(StorageError::Conflict)
    ));
    assert_eq!(register(&storage, "bob").await, first + 2);

    flush_redis(&url).await;
}
