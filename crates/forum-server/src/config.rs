use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use forum_api::Limits;
use forum_crypto::token::DEFAULT_TOKEN_LIFETIME_HOURS;

/// Secret shipped in sample env files. Refused so it never reaches production.
const PLACEHOLDER_SECRET: &str = "change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Sqlite,
    Redis,
    Memory,
}

impl FromStr for Engine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Engine::Sqlite),
            "redis" => Ok(Engine::Redis),
            "memory" => Ok(Engine::Memory),
            other => bail!("unknown storage engine {:?} (expected sqlite, redis or memory)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub engine: Engine,
    pub db_path: PathBuf,
    pub redis_url: String,
    pub jwt_secret: String,
    pub token_lifetime: chrono::Duration,
    pub storage_timeout: Duration,
    pub limits: Limits,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys take their defaults;
    /// set but unparsable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("FORUM_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .context("FORUM_JWT_SECRET must be set")?;
        if jwt_secret == PLACEHOLDER_SECRET {
            bail!("FORUM_JWT_SECRET is still the placeholder value");
        }

        let defaults = Limits::default();
        let limits = Limits {
            default_posts: parsed(&lookup, "FORUM_DEFAULT_POSTS_LIMIT", defaults.default_posts)?,
            max_posts: parsed(&lookup, "FORUM_MAX_POSTS_LIMIT", defaults.max_posts)?,
            default_comments: parsed(
                &lookup,
                "FORUM_DEFAULT_COMMENTS_LIMIT",
                defaults.default_comments,
            )?,
            max_comments: parsed(&lookup, "FORUM_MAX_COMMENTS_LIMIT", defaults.max_comments)?,
            max_comment_length: parsed(
                &lookup,
                "FORUM_MAX_COMMENT_LENGTH",
                defaults.max_comment_length,
            )?,
        };
        if limits.max_posts == 0 || limits.max_comments == 0 {
            bail!("page size maximums must be at least 1");
        }

        let ttl_hours: i64 = parsed(&lookup, "FORUM_TOKEN_TTL_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS)?;
        if ttl_hours <= 0 {
            bail!("FORUM_TOKEN_TTL_HOURS must be positive");
        }

        Ok(Self {
            host: lookup("FORUM_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed(&lookup, "FORUM_PORT", 8080)?,
            engine: parsed(&lookup, "FORUM_STORAGE", Engine::Sqlite)?,
            db_path: lookup("FORUM_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("forum.db")),
            redis_url: lookup("FORUM_REDIS_URL")
                .unwrap_or_else(|| "redis://127.0.0.1:6379".into()),
            jwt_secret,
            token_lifetime: chrono::Duration::hours(ttl_hours),
            storage_timeout: Duration::from_millis(parsed(
                &lookup,
                "FORUM_STORAGE_TIMEOUT_MS",
                5000,
            )?),
            limits,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
    }
}
