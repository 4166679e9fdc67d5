//! HTTP route wiring: the axum adapter for `bouncer_core`'s
//! framework-agnostic pipeline — static gate pages, health endpoints,
//! and a CAPTCHA verify form.

mod captcha;
mod health;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Builds the full application router. Every path other than the
/// health/readiness/metrics trio passes through the bouncer gate.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))
        .route("/captcha/verify", get(captcha::gate).post(captcha::verify))
        .fallback(captcha::gate)
        .with_state(state)
}
