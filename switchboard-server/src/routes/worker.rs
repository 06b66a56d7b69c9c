//! Worker status and runtime configuration endpoints

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::info;

use switchboard_interfaces::WorkerConfig;

use crate::context::AppContext;
use crate::routes::HistoryQuery;

/// `GET /workers/status`
pub async fn status(State(ctx): State<Arc<AppContext>>) -> Response {
    Json(ctx.worker.status().await).into_response()
}

/// `GET /workers/history?limit=…`
pub async fn history(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).min(100);
    Json(json!({ "history": ctx.worker.history(limit).await })).into_response()
}

/// `PUT /workers/config`: replace the worker configuration at runtime
pub async fn update_config(
    State(ctx): State<Arc<AppContext>>,
    Json(config): Json<WorkerConfig>,
) -> Response {
    let applied = ctx.worker.update_config(config).await;
    info!(?applied, "worker config updated via API");
    Json(json!({ "status": "updated", "config": applied })).into_response()
}

/// `POST /workers/run`: trigger one check run now
pub async fn run_now(State(ctx): State<Arc<AppContext>>) -> Response {
    let worker = ctx.worker.clone();
    tokio::spawn(async move {
        if !worker.run_now().await {
            tracing::warn!("manual worker run skipped, previous run still active");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "status": "triggered" }))).into_response()
}
