//! Unified-session integration tests
//!
//! Exercises the multi-server facade end to end against scripted stdio
//! children: namespaced listing, call routing, and error isolation between
//! servers of the same session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::{json, Value};
use uuid::Uuid;

use switchboard_interfaces::{McpServer, RepositoryFactory, ServerStatus, ToolPreference};
use switchboard_mcp::session::SessionBinding;
use switchboard_mcp::transport::stdio::{ChildSpec, ChildSpecFactory};
use switchboard_mcp::{
    ClientRegistry, McpResult, PostOutcome, ServerHealthStatus, SessionConfig, SessionTransport,
    UnifiedSession,
};
use switchboard_storage::InMemoryRepositories;

/// Scripted MCP server exposing a single `greet` tool that answers with a
/// fixed marker, so routing is observable
fn greeter_script(marker: &str) -> String {
    format!(
        r#"
read req
printf '%s\n' '{{"jsonrpc":"2.0","id":1,"result":{{"protocolVersion":"2024-11-05","capabilities":{{"tools":{{}}}},"serverInfo":{{"name":"greeter","version":"1.0.0"}}}}}}'
read note
n=1
while read req; do
  n=$((n+1))
  case "$req" in
    *tools/list*) printf '{{"jsonrpc":"2.0","id":%s,"result":{{"tools":[{{"name":"greet","description":"greets","inputSchema":{{"type":"object"}}}}]}}}}\n' "$n" ;;
    *tools/call*) printf '{{"jsonrpc":"2.0","id":%s,"result":{{"content":[{{"type":"text","text":"{marker}"}}]}}}}\n' "$n" ;;
    *) printf '{{"jsonrpc":"2.0","id":%s,"result":{{}}}}\n' "$n" ;;
  esac
done
"#
    )
}

fn server_row(project_id: Uuid, name: &str, script: String) -> McpServer {
    McpServer {
        id: Uuid::new_v4(),
        project_id,
        name: name.into(),
        description: None,
        command: "sh".into(),
        args_encrypted: None,
        args_plain: Some(vec!["-c".into(), script]),
        env_encrypted: None,
        env_plain: None,
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

struct Fixture {
    unified: Arc<UnifiedSession>,
    registry: Arc<ClientRegistry>,
    repos: InMemoryRepositories,
    servers: Vec<McpServer>,
}

async fn fixture(servers: Vec<McpServer>) -> Fixture {
    let project_id = servers[0].project_id;
    let repos = InMemoryRepositories::new();
    for server in &servers {
        repos.insert_server(server.clone()).await;
    }

    let registry = Arc::new(ClientRegistry::new());
    let transport = SessionTransport::new(
        project_id,
        format!("/projects/{}/unified/messages", project_id),
        SessionBinding::Unified,
        SessionConfig::default(),
    );

    let unified = UnifiedSession::new(
        transport,
        servers.clone(),
        ".",
        registry.clone(),
        Arc::new(repos.clone()) as Arc<dyn RepositoryFactory>,
        Arc::new(PlainSpecs),
        Arc::new(switchboard_mcp::McpMetrics::new()),
    );

    Fixture {
        unified,
        registry,
        repos,
        servers,
    }
}

/// Drain the session stream and return the queued data payloads
async fn drain_data_frames(fx: &Fixture) -> Vec<Value> {
    fx.unified.transport().close().await;
    let frames: Vec<String> = fx.unified.transport().sse_stream().unwrap().collect().await;
    frames
        .iter()
        .filter(|f| f.starts_with("data: "))
        .map(|f| serde_json::from_str(f.trim_start_matches("data: ").trim()).unwrap())
        .collect()
}

#[tokio::test]
async fn tools_list_namespaces_across_servers() {
    let project_id = Uuid::new_v4();
    let fx = fixture(vec![
        server_row(project_id, "alpha", greeter_script("from-alpha")),
        server_row(project_id, "beta", greeter_script("from-beta")),
    ])
    .await;

    let outcome = fx
        .unified
        .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await
        .unwrap();
    assert_eq!(outcome, PostOutcome::Accepted);

    let responses = drain_data_frames(&fx).await;
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    let mut names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["alpha.greet", "beta.greet"]);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn tools_call_routes_to_the_named_server_only() {
    let project_id = Uuid::new_v4();
    let fx = fixture(vec![
        server_row(project_id, "alpha", greeter_script("from-alpha")),
        server_row(project_id, "beta", greeter_script("from-beta")),
    ])
    .await;

    let outcome = fx
        .unified
        .dispatch(json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "beta.greet", "arguments": {"who": "world"}}
        }))
        .await
        .unwrap();
    assert_eq!(outcome, PostOutcome::Accepted);

    let responses = drain_data_frames(&fx).await;
    assert_eq!(responses[0]["result"]["content"][0]["text"], "from-beta");

    // Only beta was spawned
    assert_eq!(fx.registry.len().await, 1);
    // Usage accounting went to beta
    let beta = &fx.servers[1];
    let loaded = fx.repos.servers().get(project_id, beta.id).await.unwrap().unwrap();
    assert_eq!(loaded.total_tool_calls, 1);
    assert_eq!(fx.repos.tool_call_log_len().await, 1);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn unknown_namespace_is_method_not_found() {
    let project_id = Uuid::new_v4();
    let fx = fixture(vec![server_row(project_id, "alpha", greeter_script("a"))]).await;

    fx.unified
        .dispatch(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": {"name": "ghost.greet", "arguments": {}}
        }))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    assert_eq!(responses[0]["error"]["code"], -32601);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn one_failing_server_does_not_poison_the_listing() {
    let project_id = Uuid::new_v4();
    let mut broken = server_row(project_id, "broken", String::new());
    broken.command = "/nonexistent/mcp-server".into();
    broken.args_plain = None;

    let fx = fixture(vec![
        server_row(project_id, "alpha", greeter_script("from-alpha")),
        broken,
    ])
    .await;

    fx.unified
        .dispatch(json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "alpha.greet");

    // The failure was recorded against the broken server only
    let broken_id = fx.servers[1].id;
    let health = fx.unified.health_of(broken_id).await.unwrap();
    assert_eq!(health.consecutive_failures, 1);
    let alpha_health = fx.unified.health_of(fx.servers[0].id).await.unwrap();
    assert_eq!(alpha_health.status, ServerHealthStatus::Healthy);
    assert_eq!(alpha_health.tools_available, 1);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn repeated_failures_degrade_then_fail_one_server() {
    let project_id = Uuid::new_v4();
    let mut broken = server_row(project_id, "broken", String::new());
    broken.command = "/nonexistent/mcp-server".into();
    broken.args_plain = None;

    let fx = fixture(vec![
        server_row(project_id, "alpha", greeter_script("from-alpha")),
        broken,
    ])
    .await;
    let broken_id = fx.servers[1].id;

    for i in 0..5 {
        fx.unified
            .dispatch(json!({
                "jsonrpc": "2.0",
                "id": i,
                "method": "tools/call",
                "params": {"name": "broken.greet", "arguments": {}}
            }))
            .await
            .unwrap();
    }

    let health = fx.unified.health_of(broken_id).await.unwrap();
    assert_eq!(health.status, ServerHealthStatus::Failed);
    assert_eq!(health.consecutive_failures, 5);

    // A call to the healthy sibling still succeeds
    fx.unified
        .dispatch(json!({
            "jsonrpc": "2.0",
            "id": 99,
            "method": "tools/call",
            "params": {"name": "alpha.greet", "arguments": {}}
        }))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    let last = responses.last().unwrap();
    assert_eq!(last["result"]["content"][0]["text"], "from-alpha");
    assert_eq!(
        fx.unified.health_of(fx.servers[0].id).await.unwrap().status,
        ServerHealthStatus::Healthy
    );

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn initialize_reports_the_unified_server_info() {
    let project_id = Uuid::new_v4();
    let fx = fixture(vec![server_row(project_id, "alpha", greeter_script("a"))]).await;

    fx.unified
        .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "switchboard-unified");
    assert_eq!(responses[0]["id"], 1);

    fx.registry.shutdown().await;
}

#[tokio::test]
async fn disabled_tools_are_filtered_from_the_unified_listing() {
    let project_id = Uuid::new_v4();
    let fx = fixture(vec![server_row(project_id, "alpha", greeter_script("a"))]).await;

    fx.repos
        .insert_preference(ToolPreference {
            project_id,
            server_id: fx.servers[0].id,
            tool_name: "greet".into(),
            is_enabled: false,
        })
        .await;

    fx.unified
        .dispatch(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await
        .unwrap();

    let responses = drain_data_frames(&fx).await;
    let tools = responses[0]["result"]["tools"].as_array().unwrap();
    assert!(tools.is_empty());

    fx.registry.shutdown().await;
}
