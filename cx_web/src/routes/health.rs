//! ABOUTME: Health and metrics endpoints for probes and scraping
//! ABOUTME: Liveness, readiness, verbose diagnostics, and Prometheus text

use actix_web::{get, web, HttpResponse};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ApiResponse, ErrorBody, ErrorEnvelope};
use crate::AppState;

/// Liveness: the process is up and serving
#[get("/health")]
pub async fn liveness() -> HttpResponse {
    ApiResponse::ok(json!({ "status": "alive" }))
}

/// Readiness: healthy database and not draining
#[get("/health/ready")]
#[instrument(skip(state))]
pub async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    let draining = state.tracker.is_shutting_down();
    let report = state.db.health_check().await;

    let ready = report.healthy && !draining;
    let diagnostics = json!({
        "database": report.healthy,
        "draining": draining,
    });

    if ready {
        ApiResponse::ok(json!({ "status": "ready", "database": true, "draining": false }))
    } else {
        HttpResponse::ServiceUnavailable().json(ErrorEnvelope {
            success: false,
            error: ErrorBody {
                code: "NOT_READY".to_string(),
                message: "Service is not ready for traffic".to_string(),
                details: Some(diagnostics),
                error_id: Uuid::new_v4().to_string(),
                request_id: None,
            },
        })
    }
}

/// Verbose diagnostics: pool stats, in-flight requests, uptime
#[get("/health/full")]
#[instrument(skip(state))]
pub async fn full(state: web::Data<AppState>) -> HttpResponse {
    state.db.update_pool_metrics();
    let report = state.db.health_check().await;

    ApiResponse::ok(json!({
        "status": if report.healthy { "healthy" } else { "unhealthy" },
        "database": {
            "healthy": report.healthy,
            "state": state.db.state(),
            "pool": report.pool,
        },
        "requests": {
            "active": state.tracker.active_count(),
            "draining": state.tracker.is_shutting_down(),
        },
        "queries_in_flight": state.db.query_tracker().in_flight_count(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// Prometheus text exposition
#[get("/metrics")]
pub async fn metrics(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    state.db.update_pool_metrics();

    let mut body = String::new();
    prometheus_client::encoding::text::encode(&mut body, &state.registry)
        .map_err(|e| ApiError::internal(format!("Failed to encode metrics: {}", e)))?;

    Ok(HttpResponse::Ok()
        .content_type("application/openmetrics-text; version=1.0.0; charset=utf-8")
        .body(body))
}
