//! Receiver endpoints on each target domain.
//!
//! A receiver consumes a one-shot step token, applies the session effect
//! (set or clear the local session cookie), and bounces the browser back to
//! the runner on the home domain. Validation fails closed: any problem with
//! the token yields a plain 400 with no state change and no redirect, and
//! the response never reveals which check failed.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use crossgate_common::{Claims, CrossgateError, SsoMode};

use super::{html_escape, redirect_html, request_scheme, serving_host};
use crate::state::AppState;
use crate::token;

#[derive(Deserialize)]
pub struct ReceiverQuery {
    c: Option<String>,
    #[serde(rename = "return")]
    return_url: Option<String>,
    slow: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReceiverQuery>,
) -> Response {
    receive(state, headers, query, SsoMode::Login).await
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ReceiverQuery>,
) -> Response {
    receive(state, headers, query, SsoMode::Logout).await
}

async fn receive(
    state: AppState,
    headers: HeaderMap,
    query: ReceiverQuery,
    mode: SsoMode,
) -> Response {
    let code = query.c.unwrap_or_default();
    let return_url = query.return_url.unwrap_or_else(|| "/".to_string());
    let slow = query.slow.is_some();

    let claims = match validate(&state, mode, &headers, &code).await {
        Ok(claims) => claims,
        Err(CrossgateError::TokenInvalid) => {
            tracing::warn!(
                mode = mode.as_str(),
                host = %serving_host(&headers),
                "Rejected receiver token"
            );
            return (StatusCode::BAD_REQUEST, "Invalid/expired").into_response();
        }
        Err(e) => {
            tracing::error!(mode = mode.as_str(), error = %e, "Receiver failed");
            return (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable").into_response();
        }
    };

    let secure = request_scheme(&headers, &state.config.public_scheme) == "https";
    let mut response_headers = HeaderMap::new();

    match mode {
        SsoMode::Login => {
            let sid = claims.sid.as_deref().unwrap_or_default();
            match state.cookies.set(sid, secure) {
                Some(cookie) => {
                    response_headers.append(header::SET_COOKIE, cookie);
                }
                None => {
                    return (StatusCode::BAD_REQUEST, "Invalid/expired").into_response();
                }
            }
        }
        SsoMode::Logout => {
            for cookie in state.cookies.clear(secure) {
                response_headers.append(header::SET_COOKIE, cookie);
            }
        }
    }

    tracing::info!(
        mode = mode.as_str(),
        host = %claims.host,
        "Applied session effect"
    );

    if slow {
        let note = match mode {
            SsoMode::Login => "SID set on",
            SsoMode::Logout => "SID cleared on",
        };
        let body = format!(
            "<h3>{note} {host}</h3>{redirect}",
            host = html_escape(&claims.host),
            redirect = redirect_html(&return_url, Some(500)),
        );
        return (response_headers, Html(body)).into_response();
    }

    match HeaderValue::try_from(return_url) {
        Ok(location) => {
            response_headers.insert(header::LOCATION, location);
            (StatusCode::SEE_OTHER, response_headers, ()).into_response()
        }
        Err(_) => (StatusCode::BAD_REQUEST, "Invalid/expired").into_response(),
    }
}

/// All token checks for a receiver, collapsed to an opaque `TokenInvalid`.
/// Individual failure reasons are logged at debug level for operators only.
async fn validate(
    state: &AppState,
    mode: SsoMode,
    headers: &HeaderMap,
    code: &str,
) -> Result<Claims, CrossgateError> {
    let Some(claims) = state.codec.parse(code) else {
        tracing::debug!("Token failed signature or validity window");
        return Err(CrossgateError::TokenInvalid);
    };

    if claims.mode != mode {
        tracing::debug!(expected = mode.as_str(), "Token mode mismatch");
        return Err(CrossgateError::TokenInvalid);
    }
    match mode {
        SsoMode::Login if claims.sid.as_deref().unwrap_or_default().is_empty() => {
            tracing::debug!("Login token without session id");
            return Err(CrossgateError::TokenInvalid);
        }
        SsoMode::Logout if claims.sid.is_some() => {
            tracing::debug!("Logout token carrying a session id");
            return Err(CrossgateError::TokenInvalid);
        }
        _ => {}
    }

    // The token is bound to one target domain; it must not be accepted
    // anywhere else
    let host = serving_host(headers);
    if host.is_empty() || claims.host != host {
        tracing::debug!(claimed = %claims.host, serving = %host, "Token host mismatch");
        return Err(CrossgateError::TokenInvalid);
    }

    let sig = token::signature(code).ok_or(CrossgateError::TokenInvalid)?;
    if !state
        .runs
        .consume(sig, state.config.sso.token_ttl_secs)
        .await?
    {
        tracing::debug!("Token already consumed");
        return Err(CrossgateError::TokenInvalid);
    }

    Ok(claims)
}
