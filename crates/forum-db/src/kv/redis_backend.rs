use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::backend::KvBackend;

/// Redis-backed primitives. The connection manager reconnects on its own and
/// is cheap to clone per command.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).context("failed to construct Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!("Connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn incr(&self, key: &str) -> Result<i64> {
        let value: i64 = self
            .manager
            .clone()
            .incr(key, 1i64)
            .await
            .with_context(|| format!("INCR {} failed", key))?;
        Ok(value)
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let _: () = self
            .manager
            .clone()
            .hset_multiple(key, fields)
            .await
            .with_context(|| format!("HSET {} failed", key))?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        let _: () = self
            .manager
            .clone()
            .hset(key, field, value)
            .await
            .with_context(|| format!("HSET {} {} failed", key, field))?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let fields: HashMap<String, String> = self
            .manager
            .clone()
            .hgetall(key)
            .await
            .with_context(|| format!("HGETALL {} failed", key))?;
        Ok(fields)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let exists: bool = self
            .manager
            .clone()
            .exists(key)
            .await
            .with_context(|| format!("EXISTS {} failed", key))?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self
            .manager
            .clone()
            .get(key)
            .await
            .with_context(|| format!("GET {} failed", key))?;
        Ok(value)
    }

    async fn set_nx(&self, key: &str, value: String) -> Result<bool> {
        let written: bool = self
            .manager
            .clone()
            .set_nx(key, value)
            .await
            .with_context(|| format!("SETNX {} failed", key))?;
        Ok(written)
    }

    async fn zadd(&self, key: &str, member: i64, score: i64) -> Result<()> {
        let _: () = self
            .manager
            .clone()
            .zadd(key, member, score)
            .await
            .with_context(|| format!("ZADD {} failed", key))?;
        Ok(())
    }

    async fn zrange_by_score_after(
        &self,
        key: &str,
        after: i64,
        count: usize,
    ) -> Result<Vec<i64>> {
        // "(" makes the lower bound exclusive so the cursor item is skipped
        let min = format!("({}", after);
        let count = isize::try_from(count).unwrap_or(isize::MAX);
        let members: Vec<i64> = self
            .manager
            .clone()
            .zrangebyscore_limit(key, min, "+inf", 0, count)
            .await
            .with_context(|| format!("ZRANGEBYSCORE {} failed", key))?;
        Ok(members)
    }
}
