//! Shared constants for Crossgate components.

/// Default Redis connection URL
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default Crossgate HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8710";

/// Default run plan lifetime (5 minutes)
pub const DEFAULT_RUN_TTL_SECS: u64 = 300;

/// Default step token lifetime (3 minutes)
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 180;

/// Clock drift tolerance between domains; tokens become valid this many
/// seconds before their issue time
pub const CLOCK_SKEW_SECS: i64 = 5;

/// Random bytes in a run identifier
pub const RUN_ID_BYTES: usize = 12;

/// Minimum length for an externally configured signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Well-known synchronization endpoint paths (before the configurable
/// URL suffix is appended)
pub mod paths {
    /// Login runner on the home domain
    pub const RUN_LOGIN: &str = "/_ms-run";

    /// Logout runner on the home domain
    pub const RUN_LOGOUT: &str = "/_ms-run-logout";

    /// Login receiver on each target domain
    pub const SSO_LOGIN: &str = "/_ms-sso";

    /// Logout receiver on each target domain
    pub const SSO_LOGOUT: &str = "/_ms-sso-logout";
}

/// Redis key prefixes
pub mod redis_keys {
    /// Run plan: ssorun:{run_id}
    pub const RUN_PREFIX: &str = "ssorun:";

    /// Consumed token signatures: ssoseen:{signature}
    pub const CONSUMED_PREFIX: &str = "ssoseen:";

    /// Active domain registry (set of hostnames)
    pub const DOMAINS: &str = "crossgate:domains";
}

/// HTTP header names
pub mod headers {
    /// Browser fetch-mode signal; anything other than "navigate" is a
    /// speculative or subresource request
    pub const SEC_FETCH_MODE: &str = "sec-fetch-mode";

    /// Scheme as seen by the fronting proxy
    pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

    /// Host as seen by the fronting proxy
    pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
}
