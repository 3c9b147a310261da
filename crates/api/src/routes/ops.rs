//! Liveness and Prometheus metrics endpoints shared by both services.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Clone)]
struct OpsState {
    service: &'static str,
    metrics: PrometheusHandle,
}

/// `GET /health` and `GET /metrics` for `service`.
pub fn router(service: &'static str, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(OpsState { service, metrics })
}

async fn health(State(state): State<OpsState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.service,
    })
}

async fn render_metrics(State(state): State<OpsState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
