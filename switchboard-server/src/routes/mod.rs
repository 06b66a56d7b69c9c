//! HTTP routes and shared handler plumbing

pub mod health;
pub mod sse;
pub mod unified;
pub mod worker;

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use switchboard_interfaces::Project;
use switchboard_mcp::PostOutcome;

use crate::context::AppContext;

/// Route table for the orchestrator
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/detailed", get(health::health_detailed))
        .route(
            "/projects/{project_id}/servers/{server_name}/sse",
            get(sse::server_sse),
        )
        .route(
            "/projects/{project_id}/servers/{server_name}/messages",
            post(sse::server_messages),
        )
        .route("/projects/{project_id}/unified/sse", get(unified::unified_sse))
        .route(
            "/projects/{project_id}/unified/messages",
            post(unified::unified_messages),
        )
        .route("/workers/status", get(worker::status))
        .route("/workers/history", get(worker::history))
        .route("/workers/config", put(worker::update_config))
        .route("/workers/run", post(worker::run_now))
        .with_state(ctx)
}

/// Query parameter carried by message POSTs
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Uuid,
}

/// Query parameter for history listings
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Uniform JSON error body
pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Load a project or produce the 404/500 response
pub async fn load_project(ctx: &AppContext, project_id: Uuid) -> Result<Project, Response> {
    match ctx.repositories.projects().get(project_id).await {
        Ok(Some(project)) => Ok(project),
        Ok(None) => Err(json_error(
            StatusCode::NOT_FOUND,
            format!("Project not found: {}", project_id),
        )),
        Err(e) => {
            error!(%project_id, error = %e, "project lookup failed");
            Err(json_error(StatusCode::INTERNAL_SERVER_ERROR, "Project lookup failed"))
        }
    }
}

/// Parse a raw POST body as a JSON value, answering 400 on garbage
pub fn parse_json_body(body: &Bytes) -> Result<serde_json::Value, Response> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "malformed JSON body");
        json_error(StatusCode::BAD_REQUEST, "Invalid JSON")
    })
}

/// Map a dispatch outcome onto the HTTP answer, recording metrics
pub fn respond_outcome(ctx: &AppContext, outcome: PostOutcome) -> Response {
    match outcome {
        PostOutcome::Accepted => {
            ctx.metrics.record_message_accepted();
            (StatusCode::ACCEPTED, Json(json!({ "status": "processing" }))).into_response()
        }
        PostOutcome::Ok => {
            ctx.metrics.record_message_accepted();
            (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
        }
        PostOutcome::BadRequest(message) => {
            ctx.metrics.record_message_rejected();
            json_error(StatusCode::BAD_REQUEST, message)
        }
    }
}

/// Build the `text/event-stream` response around a session's frame stream
///
/// A drop guard deregisters the session when the stream ends for any
/// reason, including the client hanging up mid-transfer.
pub fn sse_response(
    ctx: Arc<AppContext>,
    session_id: Uuid,
    frames: impl Stream<Item = String> + Send + 'static,
) -> Response {
    ctx.metrics.record_session_opened();
    let body_stream = async_stream::stream! {
        let _cleanup = SessionCleanup { ctx, session_id };
        futures_util::pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            yield Ok::<Bytes, std::convert::Infallible>(Bytes::from(frame));
        }
    };

    let built = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Session-ID", session_id.to_string())
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(body_stream));

    match built {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "SSE response build failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "SSE response build failed")
        }
    }
}

/// Deregisters a session from the context when its stream is dropped
struct SessionCleanup {
    ctx: Arc<AppContext>,
    session_id: Uuid,
}

impl Drop for SessionCleanup {
    fn drop(&mut self) {
        self.ctx.metrics.record_session_closed();
        let ctx = self.ctx.clone();
        let session_id = self.session_id;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                ctx.drop_session(session_id).await;
                tracing::debug!(%session_id, "session deregistered");
            });
        }
    }
}
