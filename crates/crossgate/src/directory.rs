//! Domain registry lookup.
//!
//! The set of hostnames to synchronize lives outside the core - in a config
//! file for fixed fleets, or in a Redis set maintained by the host
//! application. Hosts are returned as configured; the planner canonicalizes
//! and filters them.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crossgate_common::CrossgateError;

#[async_trait]
pub trait DomainDirectory: Send + Sync {
    /// All currently active hostnames, including the caller's own.
    async fn active_hosts(&self) -> Result<Vec<String>, CrossgateError>;
}

/// Fixed host list from configuration.
pub struct StaticDirectory {
    hosts: Vec<String>,
}

impl StaticDirectory {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl DomainDirectory for StaticDirectory {
    async fn active_hosts(&self) -> Result<Vec<String>, CrossgateError> {
        Ok(self.hosts.clone())
    }
}

/// Host list from a Redis set, for deployments where the host application
/// manages the registry.
pub struct RedisDirectory {
    redis: ConnectionManager,
    key: String,
}

impl RedisDirectory {
    pub fn new(redis: ConnectionManager, key: String) -> Self {
        Self { redis, key }
    }
}

#[async_trait]
impl DomainDirectory for RedisDirectory {
    async fn active_hosts(&self) -> Result<Vec<String>, CrossgateError> {
        let mut conn = self.redis.clone();
        conn.smembers(&self.key)
            .await
            .map_err(|e| CrossgateError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_directory_returns_configured_hosts() {
        let dir = StaticDirectory::new(vec!["a.com".to_string(), "b.com".to_string()]);
        let hosts = dir.active_hosts().await.unwrap();
        assert_eq!(hosts, ["a.com", "b.com"]);
    }
}
