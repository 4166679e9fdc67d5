//! Health/readiness/metrics endpoints: readiness pings the configured
//! cache backend rather than assuming any particular one.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Liveness: is the process up at all.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    cache_backend_reachable: bool,
}

/// Readiness: can the configured cache backend be reached.
pub async fn ready_check(State(state): State<AppState>) -> Result<Json<ReadyResponse>, StatusCode> {
    if state.is_ready().await {
        Ok(Json(ReadyResponse {
            status: "ready",
            cache_backend_reachable: true,
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    version: &'static str,
    operating_mode: &'static str,
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        version: env!("CARGO_PKG_VERSION"),
        operating_mode: state.config.bouncer.operating_mode.as_str(),
    })
}
