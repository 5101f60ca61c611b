//! Health check handlers

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub session_store: String,
}

/// Readiness probe - pings the session store
///
/// Every authenticated request depends on the session store, so the
/// service is not ready while it is unreachable.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Session store unreachable", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.sessions.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                ready: true,
                session_store: "ok".to_string(),
            }),
        ),
        Err(e) => {
            tracing::warn!(store = state.sessions.name(), error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    ready: false,
                    session_store: "unreachable".to_string(),
                }),
            )
        }
    }
}

/// Prometheus-compatible metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Metrics in Prometheus text format", body = String)
    )
)]
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut output = String::new();

    output.push_str("# HELP agora_uptime_seconds Time since server start\n");
    output.push_str("# TYPE agora_uptime_seconds gauge\n");
    output.push_str(&format!("agora_uptime_seconds {}\n\n", state.uptime_secs()));

    output.push_str("# HELP agora_requests_total Total number of HTTP requests\n");
    output.push_str("# TYPE agora_requests_total counter\n");
    output.push_str(&format!(
        "agora_requests_total {}\n\n",
        state.get_request_count()
    ));

    output.push_str("# HELP agora_build_info Build information\n");
    output.push_str("# TYPE agora_build_info gauge\n");
    output.push_str(&format!(
        "agora_build_info{{version=\"{}\"}} 1\n\n",
        env!("CARGO_PKG_VERSION")
    ));

    state.auth_metrics.render(&mut output);

    let metrics = state.metrics.read().await;

    output.push_str("# HELP agora_http_requests_total HTTP requests by endpoint and status\n");
    output.push_str("# TYPE agora_http_requests_total counter\n");
    for (endpoint, endpoint_metrics) in metrics.iter() {
        for (status, count) in &endpoint_metrics.status_counts {
            output.push_str(&format!(
                "agora_http_requests_total{{endpoint=\"{endpoint}\",status=\"{status}\"}} {count}\n"
            ));
        }
    }
    output.push('\n');

    output.push_str("# HELP agora_http_request_duration_seconds HTTP request latency\n");
    output.push_str("# TYPE agora_http_request_duration_seconds histogram\n");
    for (endpoint, endpoint_metrics) in metrics.iter() {
        if endpoint_metrics.latency_count == 0 {
            continue;
        }

        let buckets = &endpoint_metrics.latency_buckets;
        let mut cumulative = 0u64;
        for (le, count) in [
            ("0.01", buckets.under_10ms),
            ("0.05", buckets.ms_10_50),
            ("0.1", buckets.ms_50_100),
            ("0.5", buckets.ms_100_500),
            ("1.0", buckets.ms_500_1000),
            ("+Inf", buckets.over_1s),
        ] {
            cumulative += count;
            output.push_str(&format!(
                "agora_http_request_duration_seconds_bucket{{endpoint=\"{endpoint}\",le=\"{le}\"}} {cumulative}\n"
            ));
        }

        let total_sum_s = (endpoint_metrics.total_latency_us as f64) / 1_000_000.0;
        output.push_str(&format!(
            "agora_http_request_duration_seconds_sum{{endpoint=\"{endpoint}\"}} {total_sum_s:.6}\n"
        ));
        output.push_str(&format!(
            "agora_http_request_duration_seconds_count{{endpoint=\"{endpoint}\"}} {}\n",
            endpoint_metrics.latency_count
        ));
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}
