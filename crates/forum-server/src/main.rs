mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use forum_api::{AppState, AppStateInner};
use forum_crypto::TokenIssuer;
use forum_db::{KvStore, MemoryBackend, RedisBackend, SqliteStore, Storage};

use crate::config::{Config, Engine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "forum=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    let storage = open_storage(&config).await?;

    let state: AppState = Arc::new(AppStateInner {
        storage,
        tokens: TokenIssuer::new(&config.jwt_secret, config.token_lifetime),
        limits: config.limits.clone(),
        storage_timeout: config.storage_timeout,
    });

    let app = forum_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Forum server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let storage = match config.engine {
        Engine::Sqlite => {
            info!("Using SQLite storage at {}", config.db_path.display());
            Storage::new(SqliteStore::open(&config.db_path, config.storage_timeout)?)
        }
        Engine::Redis => {
            info!("Using Redis storage at {}", config.redis_url);
            Storage::new(KvStore::new(RedisBackend::connect(&config.redis_url).await?))
        }
        Engine::Memory => {
            info!("Using in-memory storage; data is lost on exit");
            Storage::new(KvStore::new(MemoryBackend::new()))
        }
    };
    Ok(storage)
}
