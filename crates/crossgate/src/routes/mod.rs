//! HTTP route handlers for Crossgate.

use axum::{
    Router,
    http::{HeaderMap, header},
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crossgate_common::constants::headers as proto_headers;
use crossgate_common::{SsoMode, canonical_host};

use crate::state::AppState;

mod gate;
mod health;
mod hooks;
mod receiver;
mod runner;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let suffix = state.config.sso.url_suffix.clone();
    let sync = |path: &str| format!("{path}{suffix}");

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Host-application hooks (plan a run, get the kickoff URL)
        .route("/hooks/login", post(hooks::login))
        .route("/hooks/logout", post(hooks::logout))

        // Runners on the home domain
        .route(&sync(SsoMode::Login.runner_path()), get(runner::login))
        .route(&sync(SsoMode::Logout.runner_path()), get(runner::logout))

        // Receivers on each target domain
        .route(&sync(SsoMode::Login.receiver_path()), get(receiver::login))
        .route(&sync(SsoMode::Logout.receiver_path()), get(receiver::logout))

        // Preload defense + no-store stamping for the sync endpoints
        .layer(middleware::from_fn_with_state(state.clone(), gate::sync_gate))
        .layer(TraceLayer::new_for_http())

        // Add shared state
        .with_state(state)
}

/// Scheme for building absolute URLs: forwarded-proto when a proxy says so,
/// otherwise the configured public scheme.
pub(crate) fn request_scheme(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(proto_headers::X_FORWARDED_PROTO)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_lowercase())
        .filter(|v| v == "https" || v == "http")
        .unwrap_or_else(|| fallback.to_string())
}

/// Canonical hostname serving this request (forwarded host wins, port
/// stripped).
pub(crate) fn serving_host(headers: &HeaderMap) -> String {
    let raw = headers
        .get(proto_headers::X_FORWARDED_HOST)
        .or_else(|| headers.get(header::HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let first = raw.split(',').next().unwrap_or_default().trim();
    let no_port = first.split(':').next().unwrap_or_default();
    canonical_host(no_port)
}

pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Client-side redirect snippet with a noscript meta-refresh fallback.
/// `delay_ms` is the diagnostic-mode delay; `None` fires instantly.
pub(crate) fn redirect_html(url: &str, delay_ms: Option<u32>) -> String {
    let js = serde_json::to_string(url).unwrap_or_else(|_| "null".to_string());
    let script = match delay_ms {
        None => format!("<script>location.replace({js});</script>"),
        Some(ms) => {
            format!("<script>setTimeout(function(){{location.replace({js});}}, {ms});</script>")
        }
    };
    format!(
        "{script}<noscript><meta http-equiv=\"refresh\" content=\"0;url={esc}\"></noscript>",
        esc = html_escape(url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use tower::ServiceExt;

    use crate::config::{AppConfig, StoreBackend};
    use crossgate_common::SsoMode;

    async fn test_state(hosts: &[&str]) -> AppState {
        let mut config = AppConfig::default();
        config.store = StoreBackend::Memory;
        config.sso.secret = Some("an-externally-configured-secret-value".to_string());
        config.domains.hosts = hosts.iter().map(|h| h.to_string()).collect();
        AppState::new(config).await.expect("state without redis")
    }

    async fn navigate(app: &Router, host: &str, uri: &str) -> Response {
        let req = Request::builder()
            .uri(uri)
            .header(header::HOST, host)
            .header("sec-fetch-mode", "navigate")
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(req).await.unwrap()
    }

    async fn hook(app: &Router, host: &str, uri: &str, body: &str) -> Response {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::HOST, host)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Pull the `location.replace(...)` target out of a redirect page
    fn replace_target(body: &str) -> String {
        let start = body.find("location.replace(").expect("redirect script") + 17;
        let rest = &body[start..];
        let end = rest.find(");").expect("script end");
        serde_json::from_str(&rest[..end]).expect("JSON string literal")
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        let (_, qs) = url.split_once('?')?;
        for pair in qs.split('&') {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if k == name {
                return Some(urlencoding::decode(v).ok()?.into_owned());
            }
        }
        None
    }

    /// Split an absolute URL into (host, relative URI) for oneshot requests
    fn split_absolute(url: &str) -> (String, String) {
        let rest = url.split_once("://").expect("absolute URL").1;
        let (host, path) = rest.split_once('/').expect("path present");
        (host.to_string(), format!("/{path}"))
    }

    #[tokio::test]
    async fn full_login_chain_across_two_targets() {
        let state = test_state(&["a.com", "b.com", "c.com"]).await;
        let app = create_router(state.clone());

        // Login on a.com plans a two-step run
        let response = hook(
            &app,
            "a.com",
            "/hooks/login",
            r#"{"sid":"sess123","ret":"https://a.com/manager/?a=2"}"#,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let planned: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        let run_id = planned["run"].as_str().unwrap().to_string();
        assert_eq!(planned["steps"], 2);

        // Kickoff goes straight to b.com's receiver
        let start = planned["start"].as_str().unwrap().to_string();
        assert!(start.starts_with("https://b.com/_ms-sso?c="), "{start}");

        let code = query_param(&start, "c").unwrap();
        let claims = state.codec.parse(&code).expect("valid step token");
        assert_eq!(claims.mode, SsoMode::Login);
        assert_eq!(claims.sid.as_deref(), Some("sess123"));
        assert_eq!(claims.host, "b.com");

        // Step 1: receiver on b.com sets the cookie and bounces home
        let (host, uri) = split_absolute(&start);
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("ms_sid=sess123;"), "{cookie}");
        let back = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert!(back.contains("/_ms-run?run="), "{back}");
        assert_eq!(query_param(&back, "i").as_deref(), Some("1"));

        // Runner i=1 dispatches step 2 to c.com
        let (host, uri) = split_absolute(&back);
        assert_eq!(host, "a.com");
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let next = replace_target(&body_string(response).await);
        assert!(next.starts_with("https://c.com/_ms-sso?c="), "{next}");
        let claims = state
            .codec
            .parse(&query_param(&next, "c").unwrap())
            .unwrap();
        assert_eq!(claims.host, "c.com");

        // Step 2: receiver on c.com
        let (host, uri) = split_absolute(&next);
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let back = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        assert_eq!(query_param(&back, "i").as_deref(), Some("2"));

        // Runner i=2: run complete, browser returns to the Manager
        let (host, uri) = split_absolute(&back);
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let target = replace_target(&body_string(response).await);
        assert_eq!(target, "https://a.com/manager/?a=2");

        // The finished run is gone
        assert!(state.runs.get(&run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_chain_clears_the_cookie() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state.clone());

        let response = hook(&app, "a.com", "/hooks/logout", r#"{}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        let planned: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        let start = planned["start"].as_str().unwrap().to_string();
        assert!(start.starts_with("https://b.com/_ms-sso-logout?c="), "{start}");

        let (host, uri) = split_absolute(&start);
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("ms_sid=;"), "{cookie}");
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn empty_target_set_is_a_no_op() {
        let state = test_state(&["a.com"]).await;
        let app = create_router(state);

        let response = hook(&app, "a.com", "/hooks/login", r#"{"sid":"s"}"#).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn missing_run_renders_a_terminal_page() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state);

        let response = navigate(&app, "a.com", "/_ms-run?run=nope&i=0").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert!(body_string(response).await.contains("Plan not found"));
    }

    #[tokio::test]
    async fn prefetch_does_not_consume_the_token() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state.clone());

        let response = hook(&app, "a.com", "/hooks/login", r#"{"sid":"s1"}"#).await;
        let planned: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        let start = planned["start"].as_str().unwrap().to_string();
        let (host, uri) = split_absolute(&start);

        // Speculative prefetch is refused with caching disabled
        let req = Request::builder()
            .uri(&uri)
            .header(header::HOST, host.as_str())
            .header("sec-fetch-mode", "prefetch")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        // The real navigation still succeeds afterwards
        let response = navigate(&app, &host, &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn non_get_requests_are_refused_at_the_gate() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state);

        let req = Request::builder()
            .method("POST")
            .uri("/_ms-run?run=x&i=0")
            .header(header::HOST, "a.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn mode_mismatch_is_rejected() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state.clone());

        // A valid logout token presented to the login receiver
        let code = state
            .codec
            .make(SsoMode::Logout, None, "b.com", 180)
            .unwrap();
        let uri = format!(
            "/_ms-sso?c={}&return=%2F",
            urlencoding::encode(&code)
        );
        let response = navigate(&app, "b.com", &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_string(response).await, "Invalid/expired");
    }

    #[tokio::test]
    async fn token_is_bound_to_its_target_host() {
        let state = test_state(&["a.com", "b.com", "c.com"]).await;
        let app = create_router(state.clone());

        let code = state
            .codec
            .make(SsoMode::Login, Some("s1"), "b.com", 180)
            .unwrap();
        let uri = format!("/_ms-sso?c={}&return=%2F", urlencoding::encode(&code));

        // Presented on c.com instead of b.com
        let response = navigate(&app, "c.com", &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Still good on the host it was minted for
        let response = navigate(&app, "b.com", &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn consumed_token_cannot_be_replayed() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state.clone());

        let code = state
            .codec
            .make(SsoMode::Login, Some("s1"), "b.com", 180)
            .unwrap();
        let uri = format!("/_ms-sso?c={}&return=%2F", urlencoding::encode(&code));

        let response = navigate(&app, "b.com", &uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = navigate(&app, "b.com", &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn slow_mode_shows_the_hop_and_keeps_the_flag() {
        let state = test_state(&["a.com", "b.com"]).await;
        let app = create_router(state.clone());

        let response = hook(&app, "a.com", "/hooks/login", r#"{"sid":"s1"}"#).await;
        let planned: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        let run_id = planned["run"].as_str().unwrap();

        let uri = format!("/_ms-run?run={run_id}&i=0&slow=1");
        let response = navigate(&app, "a.com", &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Step 1/1"), "{body}");
        assert!(body.contains("<code>"), "{body}");
        // The flag rides along on both chain URLs
        let target = replace_target(&body);
        assert!(target.contains("slow=1"), "{target}");
    }

    #[test]
    fn serving_host_prefers_forwarded_host_and_strips_ports() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "internal:8080".parse().unwrap());
        assert_eq!(serving_host(&headers), "internal");

        headers.insert(
            proto_headers::X_FORWARDED_HOST,
            "B.com:443".parse().unwrap(),
        );
        assert_eq!(serving_host(&headers), "b.com");
    }

    #[test]
    fn redirect_html_escapes_the_noscript_fallback() {
        let html = redirect_html("https://a.com/?x=1&y=2", None);
        assert!(html.contains("location.replace(\"https://a.com/?x=1&y=2\")"));
        assert!(html.contains("url=https://a.com/?x=1&amp;y=2"));
    }
}
