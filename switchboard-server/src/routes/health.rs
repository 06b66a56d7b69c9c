//! Liveness and detail endpoints

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::context::AppContext;

/// `GET /health`: cheap liveness probe
pub async fn health() -> Response {
    Json(json!({ "status": "ok", "service": "switchboard" })).into_response()
}

/// `GET /health/detailed`: session, pool, worker, and storage state
pub async fn health_detailed(State(ctx): State<Arc<AppContext>>) -> Response {
    let storage_healthy = ctx.repositories.health_check().await.is_ok();
    let status = if storage_healthy { "ok" } else { "degraded" };

    let body = json!({
        "status": status,
        "uptime_seconds": ctx.started_at.elapsed().as_secs(),
        "active_sessions": ctx.sessions.len().await,
        "unified_sessions": ctx.unified.read().await.len(),
        "pooled_clients": ctx.clients.len().await,
        "storage_healthy": storage_healthy,
        "metrics": ctx.metrics.snapshot(),
        "worker": ctx.worker.status().await,
    });

    let code = if storage_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body)).into_response()
}
