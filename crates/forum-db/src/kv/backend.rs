use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

/// The key-value primitives the engine relies on. Nothing else is assumed:
/// no transactions, no scripting, no secondary indices.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Atomically increment an integer key and return the new value.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()>;

    /// All fields of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set only if absent. Returns whether the value was written.
    async fn set_nx(&self, key: &str, value: String) -> Result<bool>;

    async fn zadd(&self, key: &str, member: i64, score: i64) -> Result<()>;

    /// Members with score strictly greater than `after`, ascending by score,
    /// at most `count` of them.
    async fn zrange_by_score_after(&self, key: &str, after: i64, count: usize)
    -> Result<Vec<i64>>;
}
