//! Hook endpoints for the host application.
//!
//! The host application calls these when a Manager login or logout happens
//! on this domain. Crossgate plans a synchronization run across the other
//! registered domains and returns the kickoff URL; the host navigates the
//! browser there (same tab) to start the redirect chain. No targets means
//! nothing to do: 204 and the login/logout proceeds purely locally.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crossgate_common::SsoMode;

use super::{request_scheme, serving_host};
use crate::chain;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginHook {
    /// Session id to propagate
    sid: String,
    /// Final URL to send the browser to once the chain completes
    #[serde(default)]
    ret: Option<String>,
}

#[derive(Deserialize)]
pub struct LogoutHook {
    #[serde(default)]
    ret: Option<String>,
}

#[derive(Serialize)]
pub struct HookResponse {
    /// Run identifier
    run: String,
    /// Number of planned steps
    steps: usize,
    /// First receiver URL; navigating here starts the chain
    start: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginHook>,
) -> Response {
    if body.sid.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing session id").into_response();
    }
    plan_and_start(state, headers, SsoMode::Login, Some(body.sid), body.ret).await
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LogoutHook>,
) -> Response {
    plan_and_start(state, headers, SsoMode::Logout, None, body.ret).await
}

async fn plan_and_start(
    state: AppState,
    headers: HeaderMap,
    mode: SsoMode,
    sid: Option<String>,
    ret: Option<String>,
) -> Response {
    let home = serving_host(&headers);
    if home.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing host").into_response();
    }

    let targets = match state.directory.active_hosts().await {
        Ok(hosts) => hosts,
        Err(e) => {
            tracing::error!(error = %e, "Domain directory unavailable");
            return (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable").into_response();
        }
    };

    let planned = match mode {
        SsoMode::Login => {
            let sid = sid.unwrap_or_default();
            state
                .planner
                .plan_login(state.runs.as_ref(), &home, &targets, &sid)
                .await
        }
        SsoMode::Logout => {
            state
                .planner
                .plan_logout(state.runs.as_ref(), &home, &targets)
                .await
        }
    };

    let planned = match planned {
        Ok(planned) => planned,
        Err(e) => {
            // Propagation failed; the primary login/logout on the home
            // domain is unaffected
            tracing::error!(mode = mode.as_str(), error = %e, "Failed to plan run");
            return (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable").into_response();
        }
    };

    let Some((run_id, plan)) = planned else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let Some(first) = plan.steps.first() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let scheme = request_scheme(&headers, &state.config.public_scheme);
    let suffix = &state.config.sso.url_suffix;
    let ret = ret.as_deref().filter(|r| !r.is_empty());

    // The kickoff visits step 0's receiver directly; its return URL points
    // at the runner with i=1
    let next = chain::runner_url(&scheme, &plan.home, mode, &run_id, 1, ret, suffix, false);
    let start = chain::receiver_url(first, mode, &next, suffix, false);

    Json(HookResponse {
        run: run_id,
        steps: plan.steps.len(),
        start,
    })
    .into_response()
}
