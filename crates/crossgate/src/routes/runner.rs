//! Runner endpoints on the home domain.
//!
//! The runner sequences a run one step per request: it loads and touches the
//! run, redirects the browser to the current step's receiver, and hands it a
//! return URL pointing back here with the next index. When the index reaches
//! the step count the run is deleted and the browser is sent to `ret` (or a
//! terminal page). A missing or expired run gets a terminal page too, not an
//! error status.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;

use crossgate_common::{RunPlan, SsoMode};

use super::{html_escape, redirect_html, request_scheme};
use crate::chain::{self, Advance};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RunnerQuery {
    run: Option<String>,
    i: Option<i64>,
    ret: Option<String>,
    slow: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RunnerQuery>,
) -> Response {
    run_step(state, headers, query, SsoMode::Login).await
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RunnerQuery>,
) -> Response {
    run_step(state, headers, query, SsoMode::Logout).await
}

async fn run_step(
    state: AppState,
    headers: HeaderMap,
    query: RunnerQuery,
    mode: SsoMode,
) -> Response {
    let run_id = query.run.unwrap_or_default();
    let index = query.i.unwrap_or(0).max(0) as usize;
    let ret = query.ret.as_deref().filter(|r| !r.is_empty());
    let slow = query.slow.is_some();

    let plan = match state.runs.get(&run_id).await {
        Err(e) => {
            tracing::error!(run_id = %run_id, error = %e, "Run store unavailable");
            return (StatusCode::SERVICE_UNAVAILABLE, "Temporarily unavailable").into_response();
        }
        Ok(None) => return plan_not_found_page(mode),
        Ok(Some(plan)) => plan,
    };
    if plan.home.is_empty() || plan.steps.is_empty() {
        return plan_not_found_page(mode);
    }

    // Keep the run alive while the browser walks the chain
    if let Err(e) = state.runs.touch(&run_id, state.config.sso.run_ttl_secs).await {
        tracing::warn!(run_id = %run_id, error = %e, "Failed to extend run");
    }

    match chain::advance(&plan, index) {
        Advance::Complete => {
            if let Err(e) = state.runs.delete(&run_id).await {
                tracing::warn!(run_id = %run_id, error = %e, "Failed to delete finished run");
            }
            tracing::info!(run_id = %run_id, mode = mode.as_str(), "Run complete");
            match ret {
                Some(ret) => Html(redirect_html(ret, None)).into_response(),
                None => done_page(mode),
            }
        }
        Advance::Visit { step, next_index } => {
            let scheme = request_scheme(&headers, &state.config.public_scheme);
            let suffix = &state.config.sso.url_suffix;
            let next = chain::runner_url(
                &scheme, &plan.home, mode, &run_id, next_index, ret, suffix, slow,
            );
            let url = chain::receiver_url(step, mode, &next, suffix, slow);

            tracing::debug!(
                run_id = %run_id,
                step = index + 1,
                total = plan.steps.len(),
                target = %step.host,
                "Dispatching step"
            );

            if slow {
                slow_step_page(mode, &plan, index, &url)
            } else {
                Html(redirect_html(&url, None)).into_response()
            }
        }
    }
}

fn plan_not_found_page(mode: SsoMode) -> Response {
    let title = match mode {
        SsoMode::Login => "Crossgate SSO: Plan not found",
        SsoMode::Logout => "Crossgate SSO logout: Plan not found",
    };
    Html(format!("<h2>{title}</h2>")).into_response()
}

fn done_page(mode: SsoMode) -> Response {
    let title = match mode {
        SsoMode::Login => "Crossgate SSO: Done",
        SsoMode::Logout => "Crossgate SSO logout: Done",
    };
    Html(format!(
        "<h2>{title} \u{2714}</h2>\
         <script>setTimeout(function(){{window.close&&window.close();}},800);</script>"
    ))
    .into_response()
}

/// Diagnostic mode: show the computed URL and delay the hop so an operator
/// can watch the chain advance.
fn slow_step_page(mode: SsoMode, plan: &RunPlan, index: usize, url: &str) -> Response {
    let label = match mode {
        SsoMode::Login => "Step",
        SsoMode::Logout => "Logout",
    };
    let host = plan
        .steps
        .get(index)
        .map(|s| s.host.as_str())
        .unwrap_or_default();
    Html(format!(
        "<h2>{label} {step}/{total} \u{2192} {host}</h2>\
         <p><code>{url_esc}</code></p>\
         {redirect}",
        step = index + 1,
        total = plan.steps.len(),
        host = html_escape(host),
        url_esc = html_escape(url),
        redirect = redirect_html(url, Some(800)),
    ))
    .into_response()
}
