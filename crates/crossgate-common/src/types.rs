//! Core protocol types shared across Crossgate components.

use serde::{Deserialize, Serialize};

/// Which session effect a token or endpoint carries.
///
/// Login propagates a session id to the target domain; logout conveys the
/// absence of one and clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsoMode {
    Login,
    Logout,
}

impl SsoMode {
    /// Runner endpoint path on the home domain for this mode
    pub fn runner_path(&self) -> &'static str {
        match self {
            Self::Login => crate::constants::paths::RUN_LOGIN,
            Self::Logout => crate::constants::paths::RUN_LOGOUT,
        }
    }

    /// Receiver endpoint path on each target domain for this mode
    pub fn receiver_path(&self) -> &'static str {
        match self {
            Self::Login => crate::constants::paths::SSO_LOGIN,
            Self::Logout => crate::constants::paths::SSO_LOGOUT,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
        }
    }
}

/// Signed token claims (the `payload` segment of a token).
///
/// `sid` is present for login tokens only. `host` names the target domain
/// the token was minted for; receivers reject tokens whose `host` does not
/// match the domain serving the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub mode: SsoMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    pub host: String,

    /// Issued-at (unix seconds)
    pub iat: i64,

    /// Not-before; `iat` minus the clock-skew tolerance
    pub nbf: i64,

    /// Expiry (unix seconds)
    pub exp: i64,
}

impl Claims {
    /// Check if the claims' expiry has passed
    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }

    /// Check if the claims are not yet valid
    pub fn is_premature(&self) -> bool {
        self.nbf > chrono::Utc::now().timestamp()
    }
}

/// One synchronization step: visit `host`'s receiver carrying `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStep {
    pub host: String,
    pub code: String,
}

/// A persisted, TTL-bounded sequence of per-domain synchronization steps
/// created by one login/logout event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    /// Canonical hostname that initiated the run
    pub home: String,

    /// Ordered steps, one per target domain
    pub steps: Vec<RunStep>,
}

/// Normalize a hostname for comparison and deduplication: trim whitespace,
/// strip an `http://`/`https://` prefix, drop a trailing slash, lowercase.
pub fn canonical_host(raw: &str) -> String {
    let mut h = raw.trim();
    for scheme in ["https://", "http://"] {
        let prefix = scheme.len();
        // Byte comparison; an ASCII match guarantees a char boundary
        if h.len() >= prefix && h.as_bytes()[..prefix].eq_ignore_ascii_case(scheme.as_bytes()) {
            h = &h[prefix..];
            break;
        }
    }
    h.trim_end_matches('/').to_lowercase()
}
