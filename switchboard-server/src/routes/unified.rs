//! Unified session endpoints
//!
//! `GET  /projects/{project_id}/unified/sse`
//! `POST /projects/{project_id}/unified/messages?sessionId=…`

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tracing::{error, info};
use uuid::Uuid;

use switchboard_mcp::session::{SessionBinding, SessionTransport};
use switchboard_mcp::UnifiedSession;

use crate::auth::authorize;
use crate::context::AppContext;
use crate::routes::sse::{peer_ip, MAX_MESSAGE_BYTES};
use crate::routes::{
    json_error, load_project, parse_json_body, respond_outcome, sse_response, SessionQuery,
};

/// Open a unified SSE stream fronting every enabled server of the project
pub async fn unified_sse(
    State(ctx): State<Arc<AppContext>>,
    Path(project_id): Path<Uuid>,
    request: Request<Body>,
) -> Response {
    let project = match load_project(&ctx, project_id).await {
        Ok(project) => project,
        Err(response) => return response,
    };

    if !project.unified_mcp_enabled {
        return json_error(
            StatusCode::NOT_FOUND,
            format!("Unified MCP is not enabled for project {}", project_id),
        );
    }

    if let Err((status, message)) = authorize(
        &ctx.identity,
        &project,
        request.headers(),
        peer_ip(&request),
        project.sse_auth_required,
    )
    .await
    {
        return json_error(status, message);
    }

    let servers = match ctx.repositories.servers().list_enabled(project_id).await {
        Ok(servers) => servers,
        Err(e) => {
            error!(%project_id, error = %e, "server listing failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server listing failed");
        }
    };

    let message_path = format!("/projects/{}/unified/messages", project_id);
    let transport = SessionTransport::new(
        project_id,
        message_path,
        SessionBinding::Unified,
        ctx.session_config(),
    );

    let stream = match transport.sse_stream() {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "unified session stream setup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Session setup failed");
        }
    };

    let unified = UnifiedSession::new(
        transport.clone(),
        servers,
        &ctx.config.mcp.namespace_separator,
        ctx.clients.clone(),
        ctx.repositories.clone(),
        ctx.specs.clone(),
        ctx.metrics.clone(),
    );

    ctx.sessions.insert(transport.clone()).await;
    ctx.unified
        .write()
        .await
        .insert(transport.session_id(), unified);
    info!(
        session = %transport.session_id(),
        project = %project.slug,
        "unified SSE session opened"
    );

    sse_response(ctx.clone(), transport.session_id(), stream)
}

/// Accept one JSON-RPC message for a unified session
pub async fn unified_messages(
    State(ctx): State<Arc<AppContext>>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<SessionQuery>,
    request: Request<Body>,
) -> Response {
    let project = match load_project(&ctx, project_id).await {
        Ok(project) => project,
        Err(response) => return response,
    };

    if let Err((status, message)) = authorize(
        &ctx.identity,
        &project,
        request.headers(),
        peer_ip(&request),
        project.message_auth_required,
    )
    .await
    {
        return json_error(status, message);
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_MESSAGE_BYTES).await {
        Ok(body) => body,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, format!("unreadable body: {}", e)),
    };
    let message = match parse_json_body(&body) {
        Ok(message) => message,
        Err(response) => return response,
    };

    let Some(unified) = ctx.unified.read().await.get(&query.session_id).cloned() else {
        return json_error(
            StatusCode::NOT_FOUND,
            format!("Session not found: {}", query.session_id),
        );
    };

    if unified.transport().project_id() != project_id {
        return json_error(StatusCode::BAD_REQUEST, "Session project mismatch");
    }

    match unified.dispatch(message).await {
        Ok(outcome) => respond_outcome(&ctx, outcome),
        Err(e) => {
            error!(session = %query.session_id, error = %e, "unified dispatch failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
