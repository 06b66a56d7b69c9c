//! Single-server proxy integration tests
//!
//! Drives a full session (initialize → tools/list → tools/call) through
//! the dispatcher against a scripted child that echoes the request back,
//! proving arguments pass through the proxy unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use uuid::Uuid;

use switchboard_interfaces::{McpServer, RepositoryFactory, ServerStatus};
use switchboard_mcp::session::{SessionBinding, SessionTransport};
use switchboard_mcp::transport::stdio::{ChildSpec, ChildSpecFactory};
use switchboard_mcp::{ClientRegistry, McpResult, PostOutcome, SessionConfig, SessionHandler};
use switchboard_storage::InMemoryRepositories;

/// A child that answers tools/call by embedding the raw request frame into
/// its result, so the test can inspect exactly what arrived
const ECHO_SERVER: &str = r#"
read req
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"echo","version":"1.0.0"}}}'
read note
n=1
while read req; do
  n=$((n+1))
  case "$req" in
    *tools/list*) printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"echoes arguments","inputSchema":{"type":"object"}}]}}\n' "$n" ;;
    *tools/call*) printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":%s}}\n' "$n" "$req" ;;
    *) printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$n" ;;
  esac
done
"#;

struct PlainSpecs;

impl ChildSpecFactory for PlainSpecs {
    fn resolve(&self, server: &McpServer) -> McpResult<ChildSpec> {
        Ok(ChildSpec {
            project_id: server.project_id,
            server_id: server.id,
            name: server.name.clone(),
            command: server.command.clone(),
            args: server.args_plain.clone().unwrap_or_default(),
            env: server.env_plain.clone().unwrap_or_default(),
            cwd: None,
            timeout: Duration::from_secs(2),
        })
    }
}

fn echo_server_row(project_id: Uuid) -> McpServer {
    McpServer {
        id: Uuid::new_v4(),
        project_id,
        name: "echo".into(),
        description: None,
        command: "sh".into(),
        args_encrypted: None,
        args_plain: Some(vec!["-c".into(), ECHO_SERVER.into()]),
        env_encrypted: None,
        env_plain: Some(HashMap::new()),
        cwd: None,
        timeout_s: 2,
        transport_type: "stdio".into(),
        status: ServerStatus::Active,
        is_enabled: true,
        last_started_at: None,
        last_error: None,
        total_tool_calls: 0,
        last_used_at: None,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    }
}

struct Fixture {
    handler: SessionHandler,
    session: Arc<SessionTransport>,
    registry: Arc<ClientRegistry>,
    repos: InMemoryRepositories,
    metrics: Arc<switchboard_mcp::McpMetrics>,
    server_id: Uuid,
    project_id: Uuid,
}

async fn fixture() -> Fixture {
    let project_id = Uuid::new_v4();
    let server = echo_server_row(project_id);
    let server_id = server.id;

    let repos = InMemoryRepositories::new();
    repos.insert_server(server).await;

    let registry = Arc::new(ClientRegistry::new());
    let metrics = Arc::new(switchboard_mcp::McpMetrics::new());
    let handler = SessionHandler::new(
        registry.clone(),
        Arc::new(repos.clone()) as Arc<dyn RepositoryFactory>,
        Arc::new(PlainSpecs),
        metrics.clone(),
    );

    let session = SessionTransport::new(
        project_id,
        format!("/projects/{}/servers/echo/messages", project_id),
        SessionBinding::Server {
            server_id,
            server_name: "echo".into(),
        },
        SessionConfig::default(),
    );

    Fixture {
        handler,
        session,
        registry,
        repos,
        metrics,
        server_id,
        project_id,
    }
}

async fn drain_data_frames(fx: &Fixture) -> Vec<Value> {
    fx.session.close().await;
    let frames: Vec<String> = fx.session.sse_stream().unwrap().collect().await;
    frames
        .iter()
        .filter(|f| f.starts_with("data: "))
        .map(|f| serde_json::from_str(f.trim_start_matches("data: ").trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn arguments_round_trip_unchanged() {
    let fx = fixture().await;

    let arguments = json!({
        "who": "world",
        "count": 3,
        "nested": {"flag": true, "values": [1, 2, 3]},
        "unicode": "héllo ≈ wörld"
    });

    let outcome = fx
        .handler
        .dispatch(
            &fx.session,
            json!({
                "jsonrpc": "2.0",
                "id": 41,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": arguments}
            }),
        )
        .await
        .unwrap();
    assert_eq!(outcome, PostOutcome::Accepted);

    let responses = drain_data_frames(&fx).await;
    assert_eq!(responses.len(), 1);
    let response = &responses[0];
    assert_eq!(response["id"], 41);

    // The child saw exactly the arguments the client sent
    let relayed = &response["result"]["echo"];
    assert_eq!(relayed["method"], "tools/call");
    assert_eq!(relayed["params"]["name"], "echo");
    assert_eq!(relayed["params"]["arguments"], arguments);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn full_session_flow_in_order() {
    let fx = fixture().await;

    for (id, method, params) in [
        (1, "initialize", json!({})),
        (2, "tools/list", json!({})),
        (3, "tools/call", json!({"name": "echo", "arguments": {"k": "v"}})),
    ] {
        let outcome = fx
            .handler
            .dispatch(
                &fx.session,
                json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted, "{method}");
    }

    let responses = drain_data_frames(&fx).await;
    assert_eq!(responses.len(), 3);

    // FIFO: responses arrive in request order
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "switchboard-echo");
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["tools"][0]["name"], "echo");
    assert_eq!(responses[2]["id"], 3);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn usage_counters_and_call_log_are_recorded() {
    let fx = fixture().await;

    fx.handler
        .dispatch(
            &fx.session,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {}}
            }),
        )
        .await
        .unwrap();

    let loaded = switchboard_interfaces::ServerRepository::get(&fx.repos, fx.project_id, fx.server_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.total_tool_calls, 1);
    assert!(loaded.last_used_at.is_some());
    assert_eq!(fx.repos.tool_call_log_len().await, 1);

    let snapshot = fx.metrics.snapshot();
    assert_eq!(snapshot.tool_calls, 1);
    assert_eq!(snapshot.tool_call_failures, 0);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn disabled_tool_never_reaches_the_listing() {
    let fx = fixture().await;
    fx.repos
        .insert_preference(switchboard_interfaces::ToolPreference {
            project_id: fx.project_id,
            server_id: fx.server_id,
            tool_name: "echo".into(),
            is_enabled: false,
        })
        .await;

    fx.handler
        .dispatch(&fx.session, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    assert!(responses[0]["result"]["tools"].as_array().unwrap().is_empty());

    fx.registry.shutdown().await;
}
