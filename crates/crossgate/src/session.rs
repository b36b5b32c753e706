//! Session cookie emission.
//!
//! The one place Set-Cookie strings are assembled. Receivers either set the
//! propagated session id or clear it; clearing also covers an optional
//! root-domain-scoped cookie for split cookie configurations.

use axum::http::HeaderValue;

pub struct SessionCookies {
    name: String,
    root_domain: Option<String>,
}

impl SessionCookies {
    pub fn new(name: String, root_domain: Option<String>) -> Self {
        Self { name, root_domain }
    }

    /// Session-scoped cookie carrying the propagated session id.
    /// Returns `None` when the id contains bytes a cookie cannot carry.
    pub fn set(&self, sid: &str, secure: bool) -> Option<HeaderValue> {
        let mut cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", self.name, sid);
        if secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::try_from(cookie).ok()
    }

    /// Expire the session cookie, and its root-domain twin if configured.
    pub fn clear(&self, secure: bool) -> Vec<HeaderValue> {
        let mut values = Vec::with_capacity(2);
        values.extend(self.expired_cookie(None, secure));
        if let Some(root) = &self.root_domain {
            values.extend(self.expired_cookie(Some(root), secure));
        }
        values
    }

    fn expired_cookie(&self, domain: Option<&str>, secure: bool) -> Option<HeaderValue> {
        let mut cookie = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", self.name);
        if let Some(domain) = domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }
        if secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::try_from(cookie).ok()
    }
}
