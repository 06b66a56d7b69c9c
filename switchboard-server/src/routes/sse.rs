//! Single-server session endpoints
//!
//! `GET  /projects/{project_id}/servers/{server_name}/sse`
//! `POST /projects/{project_id}/servers/{server_name}/messages?sessionId=…`

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use tracing::{error, info};
use uuid::Uuid;

use switchboard_mcp::session::{SessionBinding, SessionTransport};

use crate::auth::authorize;
use crate::context::AppContext;
use crate::routes::{
    json_error, load_project, parse_json_body, respond_outcome, sse_response, SessionQuery,
};

/// Largest accepted message POST body
pub(crate) const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Peer address recorded by `into_make_service_with_connect_info`
pub(crate) fn peer_ip(request: &Request<Body>) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
}

/// Open an SSE stream bound to one server
pub async fn server_sse(
    State(ctx): State<Arc<AppContext>>,
    Path((project_id, server_name)): Path<(Uuid, String)>,
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
        project.sse_auth_required,
    )
    .await
    {
        return json_error(status, message);
    }

    let server = match ctx
        .repositories
        .servers()
        .get_by_name(project_id, &server_name)
        .await
    {
        Ok(Some(server)) if server.is_enabled => server,
        Ok(_) => {
            return json_error(
                StatusCode::NOT_FOUND,
                format!("Server '{}' not found or disabled in project {}", server_name, project_id),
            );
        }
        Err(e) => {
            error!(%project_id, server = %server_name, error = %e, "server lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Server lookup failed");
        }
    };

    let message_path = format!("/projects/{}/servers/{}/messages", project_id, server_name);
    let session = SessionTransport::new(
        project_id,
        message_path,
        SessionBinding::Server {
            server_id: server.id,
            server_name: server.name.clone(),
        },
        ctx.session_config(),
    );

    let stream = match session.sse_stream() {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "session stream setup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Session setup failed");
        }
    };

    ctx.sessions.insert(session.clone()).await;
    info!(
        session = %session.session_id(),
        project = %project.slug,
        server = %server.name,
        "SSE session opened"
    );

    sse_response(ctx.clone(), session.session_id(), stream)
}

/// Accept one JSON-RPC message for a single-server session
pub async fn server_messages(
    State(ctx): State<Arc<AppContext>>,
    Path((project_id, server_name)): Path<(Uuid, String)>,
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

    let Some(session) = ctx.sessions.get(query.session_id).await else {
        return json_error(
            StatusCode::NOT_FOUND,
            format!("Session not found: {}", query.session_id),
        );
    };

    if session.project_id() != project_id {
        return json_error(StatusCode::BAD_REQUEST, "Session project mismatch");
    }
    match session.binding() {
        SessionBinding::Server {
            server_name: bound, ..
        } if *bound == server_name => {}
        _ => return json_error(StatusCode::BAD_REQUEST, "Session server mismatch"),
    }

    match ctx.handler.dispatch(&session, message).await {
        Ok(outcome) => respond_outcome(&ctx, outcome),
        Err(e) => {
            error!(session = %query.session_id, error = %e, "message dispatch failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
