//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    /// Redis connectivity; absent when no backend needs Redis
    #[serde(skip_serializing_if = "Option::is_none")]
    redis: Option<bool>,
}

/// Readiness check (are all dependencies healthy?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let redis_ok = match &state.redis {
        Some(_) => Some(check_redis(&state).await),
        None => None,
    };

    if redis_ok == Some(false) {
        // Return 503 if not ready
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(Json(ReadyResponse {
            status: "ready",
            redis: redis_ok,
        }))
    }
}

async fn check_redis(state: &AppState) -> bool {
    let Some(conn) = &state.redis else {
        return false;
    };
    let mut conn = conn.clone();
    let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
    result.is_ok()
}
