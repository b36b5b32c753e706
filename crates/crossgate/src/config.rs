//! Configuration management for Crossgate.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crossgate_common::constants::{
    DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_URL, DEFAULT_RUN_TTL_SECS, DEFAULT_TOKEN_TTL_SECS,
    redis_keys,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Scheme used when building absolute URLs and no forwarded-proto
    /// header is present
    #[serde(default = "default_public_scheme")]
    pub public_scheme: String,

    /// Run store backend
    #[serde(default = "default_store_backend")]
    pub store: StoreBackend,

    /// SSO protocol configuration
    #[serde(default)]
    pub sso: SsoConfig,

    /// Domain registry configuration
    #[serde(default)]
    pub domains: DomainsConfig,
}

/// SSO-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SsoConfig {
    /// Shared signing secret; ignored when shorter than 32 bytes
    #[serde(default)]
    pub secret: Option<String>,

    /// Key file used when no secret is configured
    #[serde(default = "default_secret_file")]
    pub secret_file: String,

    /// Session cookie name propagated to target domains
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Root domain for the secondary logout cookie clear (split cookie
    /// configurations)
    #[serde(default)]
    pub root_domain: Option<String>,

    /// Run plan lifetime in seconds
    #[serde(default = "default_run_ttl")]
    pub run_ttl_secs: u64,

    /// Step token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Friendly-URL suffix appended to the well-known endpoint paths
    /// (e.g. ".html"); stripped before request classification
    #[serde(default)]
    pub url_suffix: String,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_file: default_secret_file(),
            cookie_name: default_cookie_name(),
            root_domain: None,
            run_ttl_secs: default_run_ttl(),
            token_ttl_secs: default_token_ttl(),
            url_suffix: String::new(),
        }
    }
}

/// Domain registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DomainsConfig {
    /// Where the host list comes from
    #[serde(default = "default_domain_source")]
    pub source: DomainSource,

    /// Host list for the static source
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Redis set key for the redis source
    #[serde(default = "default_domains_key")]
    pub redis_key: String,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            source: default_domain_source(),
            hosts: Vec::new(),
            redis_key: default_domains_key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainSource {
    Static,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis store (multi-instance deployments)
    Redis,
    /// In-process store (single instance serving every domain)
    Memory,
}

// Default value functions
fn default_redis_url() -> String { DEFAULT_REDIS_URL.to_string() }
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_public_scheme() -> String { "https".to_string() }
fn default_store_backend() -> StoreBackend { StoreBackend::Redis }
fn default_secret_file() -> String { "storage/secret.key".to_string() }
fn default_cookie_name() -> String { "ms_sid".to_string() }
fn default_run_ttl() -> u64 { DEFAULT_RUN_TTL_SECS }
fn default_token_ttl() -> u64 { DEFAULT_TOKEN_TTL_SECS }
fn default_domain_source() -> DomainSource { DomainSource::Static }
fn default_domains_key() -> String { redis_keys::DOMAINS.to_string() }

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let settings = config::Config::builder()
                .add_source(config::File::with_name(config_path))
                .build()
                .context("Failed to load config file")?;

            settings
                .try_deserialize()
                .context("Failed to parse config")?
        } else {
            // Use defaults if config file doesn't exist
            tracing::warn!("Config file not found, using defaults");
            Self::default()
        };

        // Apply CLI overrides
        if let Some(ref redis_url) = args.redis_url {
            config.redis_url = redis_url.clone();
        }
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if let Some(ref secret) = args.sso_secret {
            config.sso.secret = Some(secret.clone());
        }

        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            listen_addr: default_listen_addr(),
            public_scheme: default_public_scheme(),
            store: default_store_backend(),
            sso: SsoConfig::default(),
            domains: DomainsConfig::default(),
        }
    }
}
