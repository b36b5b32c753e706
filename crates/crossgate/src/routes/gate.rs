//! Request gate for the synchronization endpoints.
//!
//! Classifies inbound requests against the four well-known paths (after
//! stripping the configured URL suffix). Speculative prefetch/prerender
//! requests would silently spend one-shot tokens before the user navigates,
//! so anything that is not a plain top-level GET navigation is answered
//! no-store without touching tokens or runs. Every sync response leaves with
//! caching disabled.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crossgate_common::constants::{headers as proto_headers, paths};

use crate::state::AppState;

pub async fn sync_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let stripped = strip_suffix(&path, &state.config.sso.url_suffix);
    if !is_sync_endpoint(stripped) {
        return next.run(req).await;
    }

    let navigate = req
        .headers()
        .get(proto_headers::SEC_FETCH_MODE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("navigate"))
        .unwrap_or(true);

    if req.method() != Method::GET || !navigate {
        tracing::debug!(
            path = %path,
            method = %req.method(),
            "Refusing non-navigational request to sync endpoint"
        );
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_no_store(response.headers_mut());
        return response;
    }

    let mut response = next.run(req).await;
    apply_no_store(response.headers_mut());
    response
}

/// Disable caching on a response
pub(crate) fn apply_no_store(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
}

fn strip_suffix<'a>(path: &'a str, suffix: &str) -> &'a str {
    if !suffix.is_empty() {
        path.strip_suffix(suffix).unwrap_or(path)
    } else {
        path
    }
}

fn is_sync_endpoint(path: &str) -> bool {
    matches!(
        path,
        paths::RUN_LOGIN | paths::RUN_LOGOUT | paths::SSO_LOGIN | paths::SSO_LOGOUT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_stripped_before_matching() {
        assert_eq!(strip_suffix("/_ms-run.html", ".html"), "/_ms-run");
        assert_eq!(strip_suffix("/_ms-run", ""), "/_ms-run");
        assert_eq!(strip_suffix("/page", ".html"), "/page");
    }

    #[test]
    fn only_the_four_endpoints_are_classified() {
        assert!(is_sync_endpoint("/_ms-run"));
        assert!(is_sync_endpoint("/_ms-run-logout"));
        assert!(is_sync_endpoint("/_ms-sso"));
        assert!(is_sync_endpoint("/_ms-sso-logout"));
        assert!(!is_sync_endpoint("/_ms-run/x"));
        assert!(!is_sync_endpoint("/health"));
    }
}
