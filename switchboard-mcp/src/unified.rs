//! Unified-mode facade
//!
//! One session fronting every enabled server of a project. Tools are
//! exposed under namespaced names; per-server failures are recorded in the
//! session's health map and never fail the whole request. A failed server
//! is skipped during its cool-down and retried as recovering afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchboard_interfaces::{CallStatus, McpServer, RepositoryFactory, ToolCallLog};

use crate::error::{classify_message, McpError, McpResult};
use crate::filter::filter_tools;
use crate::handler::{
    enqueue_error, enqueue_result, initialize_result, validate_envelope, PostOutcome,
};
use crate::health::ServerHealth;
use crate::namespace::NamespaceRegistry;
use crate::protocol::{JsonRpcError, JsonRpcRequest, Tool, ToolsCallParams};
use crate::registry::{ClientKey, ClientRegistry};
use crate::session::SessionTransport;
use crate::transport::stdio::ChildSpecFactory;
use crate::ORCHESTRATOR_NAME;

/// Per-session state for a unified (multi-server) session
pub struct UnifiedSession {
    transport: Arc<SessionTransport>,

    /// Enabled servers snapshotted at session start
    servers: Vec<McpServer>,

    namespaces: std::sync::Mutex<NamespaceRegistry>,
    health: tokio::sync::Mutex<HashMap<Uuid, ServerHealth>>,

    registry: Arc<ClientRegistry>,
    repositories: Arc<dyn RepositoryFactory>,
    specs: Arc<dyn ChildSpecFactory>,
    metrics: Arc<crate::metrics::McpMetrics>,
}

impl UnifiedSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: Arc<SessionTransport>,
        servers: Vec<McpServer>,
        separator: &str,
        registry: Arc<ClientRegistry>,
        repositories: Arc<dyn RepositoryFactory>,
        specs: Arc<dyn ChildSpecFactory>,
        metrics: Arc<crate::metrics::McpMetrics>,
    ) -> Arc<Self> {
        let mut namespaces = NamespaceRegistry::new(separator);
        let mut health = HashMap::new();

        for server in servers.iter().filter(|s| s.is_enabled) {
            let namespace = namespaces.register(server.id, &server.name);
            health.insert(server.id, ServerHealth::new(server.name.clone()));
            debug!(server = %server.name, namespace = %namespace, "registered unified namespace");
        }

        info!(
            session = %transport.session_id(),
            servers = servers.len(),
            separator,
            "unified session created"
        );

        Arc::new(Self {
            transport,
            servers,
            namespaces: std::sync::Mutex::new(namespaces),
            health: tokio::sync::Mutex::new(health),
            registry,
            repositories,
            specs,
            metrics,
        })
    }

    pub fn transport(&self) -> &Arc<SessionTransport> {
        &self.transport
    }

    /// Validate and route one message for this unified session
    pub async fn dispatch(&self, message: Value) -> McpResult<PostOutcome> {
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => return Ok(PostOutcome::BadRequest(format!("invalid JSON-RPC message: {}", e))),
        };

        if let Some(outcome) = validate_envelope(&request) {
            return Ok(outcome);
        }

        match request.method.as_str() {
            "initialize" => {
                let result = initialize_result(
                    format!("{}-unified", ORCHESTRATOR_NAME),
                    format!(
                        "Switchboard unified proxy for project {}. Use tools/list to see available tools.",
                        self.transport.project_id()
                    ),
                );
                enqueue_result(&self.transport, request.id, result).await?;
                Ok(PostOutcome::Accepted)
            }
            "tools/list" => {
                self.handle_tools_list(request.id).await?;
                Ok(PostOutcome::Accepted)
            }
            "tools/call" => {
                self.handle_tools_call(request.id, request.params).await?;
                Ok(PostOutcome::Accepted)
            }
            "resources/list" => {
                enqueue_result(&self.transport, request.id, json!({ "resources": [] })).await?;
                Ok(PostOutcome::Accepted)
            }
            "resources/templates/list" => {
                enqueue_result(&self.transport, request.id, json!({ "resourceTemplates": [] }))
                    .await?;
                Ok(PostOutcome::Accepted)
            }
            "prompts/list" => {
                enqueue_result(&self.transport, request.id, json!({ "prompts": [] })).await?;
                Ok(PostOutcome::Accepted)
            }
            "shutdown" => {
                info!(session = %self.transport.session_id(), "unified shutdown requested");
                self.transport.close().await;
                Ok(PostOutcome::Ok)
            }
            method if method.starts_with("notifications/") => {
                if method == "notifications/initialized" {
                    let summary = self.health_summary().await;
                    info!(
                        session = %self.transport.session_id(),
                        health = %summary,
                        "unified client initialization complete"
                    );
                }
                Ok(PostOutcome::Ok)
            }
            method => {
                warn!(session = %self.transport.session_id(), method, "unknown unified method");
                enqueue_error(&self.transport, request.id, JsonRpcError::method_not_found(method))
                    .await?;
                Ok(PostOutcome::Accepted)
            }
        }
    }

    /// Fan tools/list out to every available server
    ///
    /// Per-server failures mark health and omit that server from the
    /// result; the request itself always succeeds.
    async fn handle_tools_list(&self, request_id: Option<Value>) -> McpResult<()> {
        let mut all_tools: Vec<Tool> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for server in self.servers.iter().filter(|s| s.is_enabled) {
            if !self.may_attempt(server).await {
                debug!(server = %server.name, "skipping failed server in cool-down");
                failed.push(server.name.clone());
                continue;
            }

            match self.list_server_tools(server).await {
                Ok(tools) => {
                    let filtered = filter_tools(
                        self.repositories.preferences(),
                        server.project_id,
                        server.id,
                        tools,
                    )
                    .await;

                    let namespaced = {
                        let namespaces = self
                            .namespaces
                            .lock()
                            .map_err(|_| McpError::internal("namespace lock poisoned"))?;
                        filtered
                            .iter()
                            .filter_map(|tool| {
                                namespaces
                                    .namespaced_name(server.id, &tool.name)
                                    .map(|name| tool.renamed(name))
                            })
                            .collect::<Vec<_>>()
                    };

                    self.record_success(server.id, namespaced.len()).await;
                    all_tools.extend(namespaced);
                }
                Err(e) => {
                    warn!(server = %server.name, error = %e, "unified tools/list failed for server");
                    self.record_failure(server.id, &e).await;
                    failed.push(server.name.clone());
                }
            }
        }

        info!(
            session = %self.transport.session_id(),
            tools = all_tools.len(),
            failed = failed.len(),
            "unified tools collected"
        );
        if !failed.is_empty() {
            warn!(session = %self.transport.session_id(), ?failed, "servers omitted from unified listing");
        }

        enqueue_result(&self.transport, request_id, json!({ "tools": all_tools })).await
    }

    /// Route a namespaced tools/call to its server
    async fn handle_tools_call(
        &self,
        request_id: Option<Value>,
        params: Option<Value>,
    ) -> McpResult<()> {
        let params: ToolsCallParams = match params.map(serde_json::from_value::<ToolsCallParams>).transpose() {
            Ok(Some(params)) if !params.name.is_empty() => params,
            _ => {
                return enqueue_error(
                    &self.transport,
                    request_id,
                    JsonRpcError::invalid_params("'name' is required"),
                )
                .await;
            }
        };

        let parsed = {
            let namespaces = self
                .namespaces
                .lock()
                .map_err(|_| McpError::internal("namespace lock poisoned"))?;
            namespaces.parse(&params.name)
        };

        let Some(parsed) = parsed else {
            return enqueue_error(
                &self.transport,
                request_id,
                JsonRpcError::method_not_found(&params.name),
            )
            .await;
        };

        let Some(server) = self.servers.iter().find(|s| s.id == parsed.server_id) else {
            return enqueue_error(
                &self.transport,
                request_id,
                JsonRpcError::method_not_found(&params.name),
            )
            .await;
        };

        let arguments = params.arguments.clone().unwrap_or_else(|| json!({}));
        let started = Instant::now();
        let outcome = self
            .call_server_tool(server, &parsed.original_name, arguments.clone())
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        self.metrics.record_tool_call(outcome.is_ok(), elapsed_ms);
        self.record_call(server, &parsed.original_name, &arguments, &outcome, elapsed_ms)
            .await;

        match outcome {
            Ok(result) => {
                self.record_success_keeping_tools(server.id).await;
                info!(
                    session = %self.transport.session_id(),
                    server = %server.name,
                    tool = %parsed.original_name,
                    elapsed_ms,
                    "unified tool call succeeded"
                );
                enqueue_result(&self.transport, request_id, result).await
            }
            Err(e) => {
                self.record_failure(server.id, &e).await;
                warn!(
                    session = %self.transport.session_id(),
                    server = %server.name,
                    tool = %parsed.original_name,
                    error = %e,
                    "unified tool call failed"
                );
                let error = match e {
                    // The child's own JSON-RPC error passes through
                    McpError::ToolError { code, message, data } => {
                        JsonRpcError::new(code, message, data)
                    }
                    other => JsonRpcError::internal_error(other.to_string()),
                };
                enqueue_error(&self.transport, request_id, error).await
            }
        }
    }

    async fn list_server_tools(&self, server: &McpServer) -> McpResult<Vec<Tool>> {
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

    /// Whether the server may be used, honoring the failure cool-down
    async fn may_attempt(&self, server: &McpServer) -> bool {
        let mut health = self.health.lock().await;
        match health.get_mut(&server.id) {
            Some(record) => {
                if record.is_failed() && record.should_attempt() {
                    record.start_recovery();
                    true
                } else {
                    record.should_attempt()
                }
            }
            None => false,
        }
    }

    async fn record_success(&self, server_id: Uuid, tools_available: usize) {
        if let Some(record) = self.health.lock().await.get_mut(&server_id) {
            record.record_success(tools_available);
        }
    }

    async fn record_success_keeping_tools(&self, server_id: Uuid) {
        if let Some(record) = self.health.lock().await.get_mut(&server_id) {
            let tools = record.tools_available;
            record.record_success(tools);
        }
    }

    async fn record_failure(&self, server_id: Uuid, error: &McpError) {
        if let Some(record) = self.health.lock().await.get_mut(&server_id) {
            let kind = match error {
                McpError::ToolError { message, .. } => classify_message(message),
                other => other.kind(),
            };
            record.record_failure(kind, error.to_string());
        }
    }

    /// Health snapshot for one server (tests and diagnostics)
    pub async fn health_of(&self, server_id: Uuid) -> Option<ServerHealth> {
        self.health.lock().await.get(&server_id).cloned()
    }

    /// Aggregate health summary for logs and the detailed health endpoint
    pub async fn health_summary(&self) -> Value {
        let health = self.health.lock().await;
        let healthy = health
            .values()
            .filter(|h| h.status == crate::health::ServerHealthStatus::Healthy)
            .count();
        let failed: Vec<&str> = health
            .values()
            .filter(|h| h.is_failed())
            .map(|h| h.server_name.as_str())
            .collect();

        json!({
            "total_servers": self.servers.len(),
            "healthy_servers": healthy,
            "failed_servers": failed,
            "server_details": health.values().map(|h| h.summary()).collect::<Vec<_>>(),
        })
    }

    /// Append the tool-call log and bump usage counters
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
