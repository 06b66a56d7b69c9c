//! MCP protocol handler for single-server sessions
//!
//! The POST endpoint hands each validated JSON-RPC message to
//! [`SessionHandler::dispatch`]. Responses are queued onto the session's
//! SSE stream; the HTTP answer only signals acceptance. The handler is a
//! function over `(session, message)`; it holds no per-session state.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_interfaces::{CallStatus, McpServer, RepositoryFactory, ToolCallLog};

use crate::error::{McpError, McpResult};
use crate::filter::filter_tools;
use crate::protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ServerCapabilities,
    ServerInfo, ToolsCallParams,
};
use crate::registry::{ClientKey, ClientRegistry};
use crate::session::{SessionBinding, SessionTransport};
use crate::transport::stdio::ChildSpecFactory;
use crate::{MCP_PROTOCOL_VERSION, ORCHESTRATOR_NAME, ORCHESTRATOR_VERSION};

/// How the POST endpoint should answer, independent of any SSE payload
#[derive(Debug, PartialEq, Eq)]
pub enum PostOutcome {
    /// 202: the real response is queued for SSE delivery
    Accepted,

    /// 200: handled, nothing queued
    Ok,

    /// 400 with a reason
    BadRequest(String),
}

/// Stateless dispatcher for single-server session traffic
pub struct SessionHandler {
    registry: Arc<ClientRegistry>,
    repositories: Arc<dyn RepositoryFactory>,
    specs: Arc<dyn ChildSpecFactory>,
    metrics: Arc<crate::metrics::McpMetrics>,
}

impl SessionHandler {
    pub fn new(
        registry: Arc<ClientRegistry>,
        repositories: Arc<dyn RepositoryFactory>,
        specs: Arc<dyn ChildSpecFactory>,
        metrics: Arc<crate::metrics::McpMetrics>,
    ) -> Self {
        Self {
            registry,
            repositories,
            specs,
            metrics,
        }
    }

    /// Validate and route one message for a single-server session
    pub async fn dispatch(
        &self,
        session: &Arc<SessionTransport>,
        message: Value,
    ) -> McpResult<PostOutcome> {
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => return Ok(PostOutcome::BadRequest(format!("invalid JSON-RPC message: {}", e))),
        };

        if let Some(outcome) = validate_envelope(&request) {
            return Ok(outcome);
        }

        let (server_id, server_name) = match session.binding() {
            SessionBinding::Server {
                server_id,
                server_name,
            } => (*server_id, server_name.clone()),
            SessionBinding::Unified => {
                return Ok(PostOutcome::BadRequest(
                    "unified session routed to single-server handler".to_string(),
                ))
            }
        };

        match request.method.as_str() {
            "initialize" => {
                let result = initialize_result(
                    format!("{}-{}", ORCHESTRATOR_NAME, server_name),
                    format!(
                        "Switchboard proxy for '{}' in project {}. Use tools/list to see available tools.",
                        server_name,
                        session.project_id()
                    ),
                );
                enqueue_result(session, request.id, result).await?;
                Ok(PostOutcome::Accepted)
            }
            "tools/list" => {
                self.handle_tools_list(session, request.id, server_id).await?;
                Ok(PostOutcome::Accepted)
            }
            "tools/call" => {
                self.handle_tools_call(session, request.id, request.params, server_id).await?;
                Ok(PostOutcome::Accepted)
            }
            "resources/list" => {
                // Resources are not proxied; answer with an empty set so
                // clients that probe for them proceed cleanly
                enqueue_result(session, request.id, json!({ "resources": [] })).await?;
                Ok(PostOutcome::Accepted)
            }
            "prompts/list" => {
                enqueue_result(session, request.id, json!({ "prompts": [] })).await?;
                Ok(PostOutcome::Accepted)
            }
            "shutdown" => {
                info!(session = %session.session_id(), "shutdown requested");
                session.close().await;
                Ok(PostOutcome::Ok)
            }
            method if method.starts_with("notifications/") => {
                if method == "notifications/initialized" {
                    info!(session = %session.session_id(), "client initialization complete");
                }
                Ok(PostOutcome::Ok)
            }
            method => {
                warn!(session = %session.session_id(), method, "unknown method");
                enqueue_error(session, request.id, JsonRpcError::method_not_found(method)).await?;
                Ok(PostOutcome::Accepted)
            }
        }
    }

    async fn handle_tools_list(
        &self,
        session: &Arc<SessionTransport>,
        request_id: Option<Value>,
        server_id: Uuid,
    ) -> McpResult<()> {
        let server = match self.lookup_enabled_server(session.project_id(), server_id).await {
            Ok(server) => server,
            Err(e) => {
                return enqueue_error(
                    session,
                    request_id,
                    JsonRpcError::internal_error(e.to_string()),
                )
                .await;
            }
        };

        let Some(server) = server else {
            // Disabled or deleted since the session started: no tools
            return enqueue_result(session, request_id, json!({ "tools": [] })).await;
        };

        match self.list_server_tools(&server).await {
            Ok(tools) => {
                let filtered =
                    filter_tools(self.repositories.preferences(), server.project_id, server.id, tools)
                        .await;
                info!(
                    session = %session.session_id(),
                    server = %server.name,
                    count = filtered.len(),
                    "serving filtered tools"
                );
                enqueue_result(session, request_id, json!({ "tools": filtered })).await
            }
            Err(e) => {
                warn!(session = %session.session_id(), server = %server.name, error = %e, "tools/list failed");
                enqueue_error(session, request_id, JsonRpcError::internal_error(e.to_string())).await
            }
        }
    }

    async fn handle_tools_call(
        &self,
        session: &Arc<SessionTransport>,
        request_id: Option<Value>,
        params: Option<Value>,
        server_id: Uuid,
    ) -> McpResult<()> {
        let params: ToolsCallParams = match params.map(serde_json::from_value::<ToolsCallParams>).transpose() {
            Ok(Some(params)) if !params.name.is_empty() => params,
            _ => {
                return enqueue_error(
                    session,
                    request_id,
                    JsonRpcError::invalid_params("'name' is required"),
                )
                .await;
            }
        };

        let server = match self.lookup_enabled_server(session.project_id(), server_id).await {
            Ok(Some(server)) => server,
            Ok(None) => {
                return enqueue_error(
                    session,
                    request_id,
                    JsonRpcError::method_not_found(&params.name),
                )
                .await;
            }
            Err(e) => {
                return enqueue_error(
                    session,
                    request_id,
                    JsonRpcError::internal_error(e.to_string()),
                )
                .await;
            }
        };

        let arguments = params.arguments.clone().unwrap_or_else(|| json!({}));
        let started = Instant::now();
        let outcome = self.call_server_tool(&server, &params.name, arguments.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.metrics.record_tool_call(outcome.is_ok(), elapsed_ms);
        self.record_call(&server, &params.name, &arguments, &outcome, elapsed_ms).await;

        match outcome {
            Ok(result) => {
                info!(
                    session = %session.session_id(),
                    server = %server.name,
                    tool = %params.name,
                    elapsed_ms,
                    "tool call succeeded"
                );
                enqueue_result(session, request_id, result).await
            }
            Err(McpError::ToolError { code, message, data }) => {
                // The child's own JSON-RPC error passes through unchanged
                enqueue_error(session, request_id, JsonRpcError::new(code, message, data)).await
            }
            Err(e) => {
                warn!(
                    session = %session.session_id(),
                    server = %server.name,
                    tool = %params.name,
                    error = %e,
                    "tool call failed"
                );
                enqueue_error(session, request_id, JsonRpcError::internal_error(e.to_string())).await
            }
        }
    }

    async fn lookup_enabled_server(
        &self,
        project_id: Uuid,
        server_id: Uuid,
    ) -> McpResult<Option<McpServer>> {
        let server = self
            .repositories
            .servers()
            .get(project_id, server_id)
            .await
            .map_err(|e| McpError::internal(format!("server lookup failed: {}", e)))?;
        Ok(server.filter(|s| s.is_enabled))
    }

    async fn list_server_tools(&self, server: &McpServer) -> McpResult<Vec<crate::protocol::Tool>> {
        let client = self.client_for(server).await?;
        client.list_tools().await
    }

    async fn call_server_tool(
        &self,
        server: &McpServer,
        tool_name: &str,
        arguments: Value,
    ) -> McpResult<Value> {
        let client = self.client_for(server).await?;
        client.call_tool(tool_name, arguments).await
    }

    async fn client_for(
        &self,
        server: &McpServer,
    ) -> McpResult<Arc<crate::transport::stdio::ChildClient>> {
        let key = ClientKey::new(server.project_id, server.id);
        self.registry
            .get_or_spawn(key, || self.specs.resolve(server))
            .await
    }

    /// Append the tool-call log and bump server usage counters
    async fn record_call(
        &self,
        server: &McpServer,
        tool_name: &str,
        input: &Value,
        outcome: &McpResult<Value>,
        elapsed_ms: u64,
    ) {
        let entry = ToolCallLog {
            server_id: server.id,
            project_id: server.project_id,
            tool_name: tool_name.to_string(),
            input: input.clone(),
            output: outcome.as_ref().ok().cloned(),
            status: if outcome.is_ok() {
                CallStatus::Success
            } else {
                CallStatus::Failed
            },
            execution_time_ms: elapsed_ms,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            timestamp: Utc::now(),
        };

        if let Err(e) = self.repositories.logs().append_tool_call(entry).await {
            warn!(server = %server.name, error = %e, "tool-call log append failed");
        }
        if let Err(e) = self.repositories.servers().record_tool_call(server.id).await {
            warn!(server = %server.name, error = %e, "usage counter update failed");
        }
    }
}

/// Envelope checks shared by the single and unified handlers
pub(crate) fn validate_envelope(request: &JsonRpcRequest) -> Option<PostOutcome> {
    if !request.has_valid_version() {
        return Some(PostOutcome::BadRequest("invalid JSON-RPC version".to_string()));
    }
    if request.method.is_empty() {
        return Some(PostOutcome::BadRequest("missing method field".to_string()));
    }
    None
}

/// Standard initialize result body
pub(crate) fn initialize_result(server_name: String, instructions: String) -> Value {
    let result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities::with_tools(),
        server_info: ServerInfo {
            name: server_name,
            version: ORCHESTRATOR_VERSION.to_string(),
        },
        instructions: Some(instructions),
    };
    // InitializeResult serialization cannot fail
    serde_json::to_value(result).unwrap_or_else(|_| json!({}))
}

pub(crate) async fn enqueue_result(
    session: &Arc<SessionTransport>,
    id: Option<Value>,
    result: Value,
) -> McpResult<()> {
    let response = JsonRpcResponse::success(result, id);
    session.enqueue(serde_json::to_value(response)?).await
}

pub(crate) async fn enqueue_error(
    session: &Arc<SessionTransport>,
    id: Option<Value>,
    error: JsonRpcError,
) -> McpResult<()> {
    let response = JsonRpcResponse::error(error, id);
    session.enqueue(serde_json::to_value(response)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use crate::transport::stdio::ChildSpec;
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use switchboard_interfaces::*;

    /// Repository stub: one project, one server, optional preference rows
    struct StubRepos {
        server: tokio::sync::Mutex<Option<McpServer>>,
        prefs: HashMap<String, bool>,
    }

    #[async_trait]
    impl ProjectRepository for StubRepos {
        async fn get(&self, _: Uuid) -> StorageResult<Option<Project>> {
            Ok(None)
        }
        async fn get_by_slug(&self, _: &str) -> StorageResult<Option<Project>> {
            Ok(None)
        }
    }

    #[async_trait]
    impl ServerRepository for StubRepos {
        async fn get(&self, _: Uuid, _: Uuid) -> StorageResult<Option<McpServer>> {
            Ok(self.server.lock().await.clone())
        }
        async fn get_by_name(&self, _: Uuid, _: &str) -> StorageResult<Option<McpServer>> {
            Ok(self.server.lock().await.clone())
        }
        async fn list_enabled(&self, _: Uuid) -> StorageResult<Vec<McpServer>> {
            Ok(self.server.lock().await.clone().into_iter().collect())
        }
        async fn list_all_enabled(&self) -> StorageResult<Vec<McpServer>> {
            Ok(vec![])
        }
        async fn update_status(
            &self,
            _: Uuid,
            _: ServerStatus,
            _: Option<String>,
            _: Option<chrono::DateTime<chrono::Utc>>,
        ) -> StorageResult<()> {
            Ok(())
        }
        async fn record_tool_call(&self, _: Uuid) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl ToolRepository for StubRepos {
        async fn list(&self, _: Uuid) -> StorageResult<Vec<McpTool>> {
            Ok(vec![])
        }
        async fn upsert(&self, _: Uuid, _: &[ToolSpec]) -> StorageResult<usize> {
            Ok(0)
        }
        async fn delete_missing(&self, _: Uuid, _: &[String]) -> StorageResult<usize> {
            Ok(0)
        }
    }

    #[async_trait]
    impl PreferenceRepository for StubRepos {
        async fn map_for_server(&self, _: Uuid, _: Uuid) -> StorageResult<HashMap<String, bool>> {
            Ok(self.prefs.clone())
        }
        async fn set(&self, _: ToolPreference) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl LogRepository for StubRepos {
        async fn append_server_log(&self, _: ServerLogEntry) -> StorageResult<()> {
            Ok(())
        }
        async fn append_tool_call(&self, _: ToolCallLog) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl WorkerConfigRepository for StubRepos {
        async fn load(&self) -> StorageResult<WorkerConfig> {
            Ok(WorkerConfig::default())
        }
        async fn save(&self, _: WorkerConfig) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl RepositoryFactory for StubRepos {
        fn projects(&self) -> &dyn ProjectRepository {
            self
        }
        fn servers(&self) -> &dyn ServerRepository {
            self
        }
        fn tools(&self) -> &dyn ToolRepository {
            self
        }
        fn preferences(&self) -> &dyn PreferenceRepository {
            self
        }
        fn logs(&self) -> &dyn LogRepository {
            self
        }
        fn worker_config(&self) -> &dyn WorkerConfigRepository {
            self
        }
        async fn health_check(&self) -> StorageResult<()> {
            Ok(())
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

    /// Scripted server answering initialize, tools/list, and tools/call
    const SCRIPTED_SERVER: &str = r#"
read req
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"scripted","version":"1.0.0"}}}'
read note
n=1
while read req; do
  n=$((n+1))
  case "$req" in
    *tools/list*) printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"echo","inputSchema":{"type":"object"}},{"name":"hello","description":"hello","inputSchema":{"type":"object"}}]}}\n' "$n" ;;
    *tools/call*) printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"called"}]}}\n' "$n" ;;
    *) printf '{"jsonrpc":"2.0","id":%s,"result":{}}\n' "$n" ;;
  esac
done
"#;

    fn fixture_server(project_id: Uuid, server_id: Uuid) -> McpServer {
        McpServer {
            id: server_id,
            project_id,
            name: "scripted".into(),
            description: None,
            command: "sh".into(),
            args_encrypted: None,
            args_plain: Some(vec!["-c".into(), SCRIPTED_SERVER.into()]),
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

    struct Fixture {
        handler: SessionHandler,
        session: Arc<SessionTransport>,
        registry: Arc<ClientRegistry>,
    }

    fn fixture(prefs: HashMap<String, bool>, server: Option<McpServer>) -> Fixture {
        let project_id = server.as_ref().map(|s| s.project_id).unwrap_or_else(Uuid::new_v4);
        let server_id = server.as_ref().map(|s| s.id).unwrap_or_else(Uuid::new_v4);

        let repos = Arc::new(StubRepos {
            server: tokio::sync::Mutex::new(server),
            prefs,
        });
        let registry = Arc::new(ClientRegistry::new());
        let handler = SessionHandler::new(
            registry.clone(),
            repos,
            Arc::new(PlainSpecs),
            Arc::new(crate::metrics::McpMetrics::new()),
        );

        let session = SessionTransport::new(
            project_id,
            "/projects/p/servers/scripted/messages",
            SessionBinding::Server {
                server_id,
                server_name: "scripted".into(),
            },
            SessionConfig::default(),
        );

        Fixture {
            handler,
            session,
            registry,
        }
    }

    async fn next_data_frame(session: &Arc<SessionTransport>) -> Value {
        // Fresh single-use consumption: collect everything after closing
        session.close().await;
        let frames: Vec<String> = session.sse_stream().unwrap().collect().await;
        let data = frames
            .iter()
            .find(|f| f.starts_with("data: "))
            .expect("expected a data frame");
        serde_json::from_str(data.trim_start_matches("data: ").trim()).unwrap()
    }

    #[tokio::test]
    async fn invalid_version_is_bad_request() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(&fx.session, json!({"jsonrpc": "1.0", "id": 1, "method": "initialize"}))
            .await
            .unwrap();
        assert!(matches!(outcome, PostOutcome::BadRequest(_)));
    }

    #[tokio::test]
    async fn initialize_queues_a_result() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(&fx.session, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted);

        let response = next_data_frame(&fx.session).await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "switchboard-scripted");
        assert!(response["result"]["instructions"].as_str().unwrap().contains("scripted"));
    }

    #[tokio::test]
    async fn unknown_method_queues_method_not_found() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(
                &fx.session,
                json!({"jsonrpc": "2.0", "id": 9, "method": "sampling/createMessage"}),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted);

        let response = next_data_frame(&fx.session).await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["id"], 9);
    }

    #[tokio::test]
    async fn resources_and_prompts_answer_empty_sets() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(&fx.session, json!({"jsonrpc": "2.0", "id": 10, "method": "resources/list"}))
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted);

        let response = next_data_frame(&fx.session).await;
        assert!(response["result"]["resources"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_return_ok_without_queueing() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(
                &fx.session,
                json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Ok);
    }

    #[tokio::test]
    async fn tools_list_applies_preferences() {
        let project_id = Uuid::new_v4();
        let server_id = Uuid::new_v4();
        let fx = fixture(
            [("hello".to_string(), false)].into(),
            Some(fixture_server(project_id, server_id)),
        );

        let outcome = fx
            .handler
            .dispatch(&fx.session, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted);

        let response = next_data_frame(&fx.session).await;
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "echo");

        fx.registry.shutdown().await;
    }

    #[tokio::test]
    async fn tools_call_routes_to_the_child() {
        let project_id = Uuid::new_v4();
        let server_id = Uuid::new_v4();
        let fx = fixture(HashMap::new(), Some(fixture_server(project_id, server_id)));

        let outcome = fx
            .handler
            .dispatch(
                &fx.session,
                json!({
                    "jsonrpc": "2.0",
                    "id": 3,
                    "method": "tools/call",
                    "params": {"name": "echo", "arguments": {"who": "world"}}
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Accepted);

        let response = next_data_frame(&fx.session).await;
        assert_eq!(response["result"]["content"][0]["text"], "called");

        fx.registry.shutdown().await;
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let fx = fixture(HashMap::new(), None);
        fx.handler
            .dispatch(
                &fx.session,
                json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {}}),
            )
            .await
            .unwrap();

        let response = next_data_frame(&fx.session).await;
        assert_eq!(response["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn dead_server_surfaces_internal_error_with_detail() {
        let project_id = Uuid::new_v4();
        let server_id = Uuid::new_v4();
        let mut server = fixture_server(project_id, server_id);
        server.command = "/nonexistent/mcp-server".into();
        server.args_plain = None;
        let fx = fixture(HashMap::new(), Some(server));

        fx.handler
            .dispatch(
                &fx.session,
                json!({
                    "jsonrpc": "2.0",
                    "id": 5,
                    "method": "tools/call",
                    "params": {"name": "echo", "arguments": {}}
                }),
            )
            .await
            .unwrap();

        let response = next_data_frame(&fx.session).await;
        assert_eq!(response["error"]["code"], -32603);
        assert!(response["error"]["data"].as_str().unwrap().contains("spawn"));
    }

    #[tokio::test]
    async fn shutdown_closes_the_session_stream() {
        let fx = fixture(HashMap::new(), None);
        let outcome = fx
            .handler
            .dispatch(&fx.session, json!({"jsonrpc": "2.0", "id": 6, "method": "shutdown"}))
            .await
            .unwrap();
        assert_eq!(outcome, PostOutcome::Ok);

        // The sentinel is already queued: the stream ends after the endpoint frame
        let frames: Vec<String> = fx.session.sse_stream().unwrap().collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: endpoint\n"));
    }
}
