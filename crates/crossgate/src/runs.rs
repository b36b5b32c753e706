//! Run plan persistence with TTL semantics.
//!
//! A run plan lives under a sanitized random id, expires after its TTL, and
//! is extended ("touched") on every runner request. The store also keeps a
//! consumed-token set so a captured step token cannot be replayed inside its
//! validity window.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crossgate_common::constants::redis_keys;
use crossgate_common::{CrossgateError, RunPlan};

pub type StoreResult<T> = Result<T, CrossgateError>;

/// TTL-scoped key-value store for run plans.
///
/// Operations are independent single-key reads/writes; last-write-wins on a
/// concurrent `put`/`touch` for the same id is acceptable because a run is
/// only advanced by one browser.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist `plan` under `id`, overwriting any existing entry.
    async fn put(&self, id: &str, plan: &RunPlan, ttl_secs: u64) -> StoreResult<()>;

    /// Fetch a plan; absent or expired entries return `None`. Expired
    /// entries are deleted on read.
    async fn get(&self, id: &str) -> StoreResult<Option<RunPlan>>;

    /// Reset the expiry of an existing plan without altering its data.
    /// No-op when the id is absent.
    async fn touch(&self, id: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Remove a plan. Idempotent.
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Record a token signature as spent. Returns `true` the first time a
    /// signature is seen, `false` on any repeat within `ttl_secs`.
    async fn consume(&self, signature: &str, ttl_secs: u64) -> StoreResult<bool>;
}

/// Restrict an id to a safe identifier subset before it becomes a storage
/// key. Everything outside `[A-Za-z0-9_-]` is dropped.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn storage_err(e: impl std::fmt::Display) -> CrossgateError {
    CrossgateError::Storage(e.to_string())
}

/// Redis-backed store; expiry is native (`SET .. EX`), so reads never see a
/// stale record.
pub struct RedisRunStore {
    redis: ConnectionManager,
}

impl RedisRunStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn run_key(id: &str) -> String {
        format!("{}{}", redis_keys::RUN_PREFIX, sanitize_id(id))
    }
}

#[async_trait]
impl RunStore for RedisRunStore {
    async fn put(&self, id: &str, plan: &RunPlan, ttl_secs: u64) -> StoreResult<()> {
        let data = serde_json::to_string(plan).map_err(storage_err)?;
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(Self::run_key(id), data, ttl_secs)
            .await
            .map_err(storage_err)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<RunPlan>> {
        let key = Self::run_key(id);
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(storage_err)?;

        match raw {
            None => Ok(None),
            Some(data) => match serde_json::from_str(&data) {
                Ok(plan) => Ok(Some(plan)),
                Err(e) => {
                    // Undecodable record; drop it rather than wedge the run
                    tracing::warn!(key = %key, error = %e, "Dropping corrupt run record");
                    let _: () = conn.del(&key).await.map_err(storage_err)?;
                    Ok(None)
                }
            },
        }
    }

    async fn touch(&self, id: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        conn.expire::<_, ()>(Self::run_key(id), ttl_secs as i64)
            .await
            .map_err(storage_err)
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(Self::run_key(id)).await.map_err(storage_err)
    }

    async fn consume(&self, signature: &str, ttl_secs: u64) -> StoreResult<bool> {
        let key = format!("{}{}", redis_keys::CONSUMED_PREFIX, sanitize_id(signature));
        let mut conn = self.redis.clone();
        // First writer wins; repeats inside the TTL see NX fail
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(storage_err)?;
        Ok(set.is_some())
    }
}

struct StoredRun {
    expires_at: i64,
    plan: RunPlan,
}

/// In-process store for single-instance deployments and tests. Expiry is
/// evaluated lazily on read, exactly like the Redis-backed store's contract.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<HashMap<String, StoredRun>>,
    consumed: RwLock<HashMap<String, i64>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn force_expire(&self, id: &str) {
        if let Some(entry) = self.runs.write().await.get_mut(&sanitize_id(id)) {
            entry.expires_at = chrono::Utc::now().timestamp() - 1;
        }
    }

    #[cfg(test)]
    async fn contains(&self, id: &str) -> bool {
        self.runs.read().await.contains_key(&sanitize_id(id))
    }

    #[cfg(test)]
    async fn expiry_of(&self, id: &str) -> Option<i64> {
        self.runs
            .read()
            .await
            .get(&sanitize_id(id))
            .map(|e| e.expires_at)
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn put(&self, id: &str, plan: &RunPlan, ttl_secs: u64) -> StoreResult<()> {
        let entry = StoredRun {
            expires_at: chrono::Utc::now().timestamp() + ttl_secs as i64,
            plan: plan.clone(),
        };
        self.runs.write().await.insert(sanitize_id(id), entry);
        Ok(())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<RunPlan>> {
        let key = sanitize_id(id);
        let now = chrono::Utc::now().timestamp();
        let mut runs = self.runs.write().await;

        match runs.get(&key) {
            None => Ok(None),
            Some(entry) if entry.expires_at < now => {
                // Lazy cleanup; the deletion is permanent even if the clock
                // later moves backwards
                runs.remove(&key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.plan.clone())),
        }
    }

    async fn touch(&self, id: &str, ttl_secs: u64) -> StoreResult<()> {
        if let Some(entry) = self.runs.write().await.get_mut(&sanitize_id(id)) {
            entry.expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.runs.write().await.remove(&sanitize_id(id));
        Ok(())
    }

    async fn consume(&self, signature: &str, ttl_secs: u64) -> StoreResult<bool> {
        let now = chrono::Utc::now().timestamp();
        let mut consumed = self.consumed.write().await;
        consumed.retain(|_, expires_at| *expires_at >= now);

        let key = sanitize_id(signature);
        if consumed.contains_key(&key) {
            return Ok(false);
        }
        consumed.insert(key, now + ttl_secs as i64);
        Ok(true)
    }
}
