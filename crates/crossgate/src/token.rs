//! Signed step tokens (HS256, `header.payload.signature`).
//!
//! Tokens are compact JWT-shaped strings: two base64url JSON segments plus a
//! base64url HMAC-SHA256 over them. A token is valid only if the signature
//! matches and the current time falls inside its `[nbf, exp]` window.
//! Validation is all-or-nothing; callers never learn which check failed.

use anyhow::{Context, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crossgate_common::constants::CLOCK_SKEW_SECS;
use crossgate_common::{Claims, SsoMode};

type HmacSha256 = Hmac<Sha256>;

/// Fixed token header segment
#[derive(Serialize)]
struct Header {
    alg: &'static str,
    typ: &'static str,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            alg: "HS256",
            typ: "JWT",
        }
    }
}

/// Builds and verifies signed tokens with a process-wide derived key.
///
/// Constructed once at startup from the resolved secret and shared via
/// `AppState`.
pub struct TokenCodec {
    key: Vec<u8>,
}

impl TokenCodec {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Mint a signed token for one synchronization step.
    ///
    /// Sets `iat = now`, `nbf = now - 5` (clock-skew tolerance across
    /// domains), `exp = now + ttl_secs`.
    pub fn make(
        &self,
        mode: SsoMode,
        sid: Option<&str>,
        host: &str,
        ttl_secs: i64,
    ) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            mode,
            sid: sid.map(str::to_string),
            host: host.to_string(),
            iat: now,
            nbf: now - CLOCK_SKEW_SECS,
            exp: now + ttl_secs,
        };
        self.encode(&claims)
    }

    /// Parse and validate a token. Returns `None` on any failure: wrong
    /// shape, bad signature, undecodable payload, not yet valid, expired.
    pub fn parse(&self, token: &str) -> Option<Claims> {
        let mut parts = token.split('.');
        let (h, p, s) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if ![h, p, s].iter().all(|seg| is_b64url_segment(seg)) {
            return None;
        }

        let sig = URL_SAFE_NO_PAD.decode(s).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(h.as_bytes());
        mac.update(b".");
        mac.update(p.as_bytes());
        // Constant-time comparison of the supplied MAC
        mac.verify_slice(&sig).ok()?;

        let payload = URL_SAFE_NO_PAD.decode(p).ok()?;
        let claims: Claims = serde_json::from_slice(&payload).ok()?;

        if claims.is_premature() || claims.is_expired() {
            return None;
        }
        Some(claims)
    }

    fn encode(&self, claims: &Claims) -> Result<String> {
        let head = serde_json::to_vec(&Header::default()).context("Failed to encode header")?;
        let payload = serde_json::to_vec(claims).context("Failed to encode claims")?;
        let seg = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(head),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .context("Signing key rejected by HMAC")?;
        mac.update(seg.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{seg}.{sig}"))
    }
}

/// The signature segment of a token, used as the replay-guard key.
pub fn signature(token: &str) -> Option<&str> {
    let mut parts = token.split('.');
    let (_h, _p, s) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || s.is_empty() {
        return None;
    }
    Some(s)
}

fn is_b64url_segment(seg: &str) -> bool {
    !seg.is_empty()
        && seg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
