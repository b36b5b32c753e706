//! Application state and shared resources.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use std::path::Path;
use std::sync::Arc;

use crate::config::{AppConfig, DomainSource, StoreBackend};
use crate::directory::{DomainDirectory, RedisDirectory, StaticDirectory};
use crate::plan::RunPlanner;
use crate::runs::{MemoryRunStore, RedisRunStore, RunStore};
use crate::secret;
use crate::session::SessionCookies;
use crate::token::TokenCodec;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Redis connection manager (auto-reconnecting); absent when every
    /// backend is in-process
    pub redis: Option<ConnectionManager>,

    /// Token codec holding the derived signing key (resolved once here,
    /// never re-read)
    pub codec: Arc<TokenCodec>,

    /// Run plan store
    pub runs: Arc<dyn RunStore>,

    /// Run planner
    pub planner: Arc<RunPlanner>,

    /// Domain registry
    pub directory: Arc<dyn DomainDirectory>,

    /// Session cookie builder
    pub cookies: Arc<SessionCookies>,
}

impl AppState {
    /// Create new application state, resolving the signing secret and
    /// connecting to Redis when a backend needs it.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let needs_redis = config.store == StoreBackend::Redis
            || config.domains.source == DomainSource::Redis;

        let redis = if needs_redis {
            let client = redis::Client::open(config.redis_url.as_str())
                .context("Failed to create Redis client")?;
            let conn = ConnectionManager::new(client)
                .await
                .context("Failed to connect to Redis")?;
            Some(conn)
        } else {
            None
        };

        let key = secret::resolve(
            config.sso.secret.as_deref(),
            Path::new(&config.sso.secret_file),
            &config.sso.cookie_name,
        )
        .context("Failed to resolve signing secret")?;
        let codec = Arc::new(TokenCodec::new(key));

        let runs: Arc<dyn RunStore> = match (config.store, redis.clone()) {
            (StoreBackend::Redis, Some(conn)) => Arc::new(RedisRunStore::new(conn)),
            _ => Arc::new(MemoryRunStore::new()),
        };

        let directory: Arc<dyn DomainDirectory> = match (config.domains.source, redis.clone()) {
            (DomainSource::Redis, Some(conn)) => {
                Arc::new(RedisDirectory::new(conn, config.domains.redis_key.clone()))
            }
            _ => Arc::new(StaticDirectory::new(config.domains.hosts.clone())),
        };

        let planner = Arc::new(RunPlanner::new(
            codec.clone(),
            config.sso.token_ttl_secs,
            config.sso.run_ttl_secs,
        ));

        let cookies = Arc::new(SessionCookies::new(
            config.sso.cookie_name.clone(),
            config.sso.root_domain.clone(),
        ));

        Ok(Self {
            config,
            redis,
            codec,
            runs,
            planner,
            directory,
            cookies,
        })
    }
}
