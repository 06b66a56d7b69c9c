//! Child-process MCP client
//!
//! Owns one stdio MCP server process: spawn, the MCP initialize handshake,
//! request dispatch through the codec, and teardown. Transient call
//! failures are reported to the caller without tearing the child down; only
//! a broken stream marks the client dead. The registry disposes dead
//! clients on next use.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{McpError, McpResult};
use crate::protocol::{ClientInfo, Tool, ToolsListResult};
use crate::stderr::StderrBuffer;
use crate::transport::codec::LineCodec;
use crate::{MCP_PROTOCOL_VERSION, ORCHESTRATOR_NAME, ORCHESTRATOR_VERSION};

/// Grace period for each stage of shutdown (stdin close, then kill)
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Turns a persisted server row into a spawnable spec
///
/// The implementation owns secret decryption; this crate never sees key
/// material.
pub trait ChildSpecFactory: Send + Sync {
    fn resolve(&self, server: &switchboard_interfaces::McpServer) -> McpResult<ChildSpec>;
}

/// Everything needed to spawn one MCP server process
///
/// `args`/`env` arrive as plaintext here; the secrets adapter has already
/// run and nothing below this point persists them.
#[derive(Debug, Clone)]
pub struct ChildSpec {
    pub project_id: Uuid,
    pub server_id: Uuid,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<String>,
    pub timeout: Duration,
}

impl ChildSpec {
    pub fn validate(&self) -> McpResult<()> {
        if self.command.trim().is_empty() {
            return Err(McpError::Configuration {
                message: format!("server '{}' has no command", self.name),
            });
        }
        Ok(())
    }
}

/// Handle to a live (or once-live) MCP child process
#[derive(Debug)]
pub struct ChildClient {
    spec: ChildSpec,
    child: Mutex<Child>,
    codec: Arc<LineCodec>,
    stderr: Arc<StdMutex<StderrBuffer>>,
    initialized: AtomicBool,
    dead: AtomicBool,
}

impl ChildClient {
    /// Spawn the child process and start its I/O tasks
    ///
    /// The returned client is not yet initialized; call
    /// [`ChildClient::initialize`] before issuing requests.
    pub async fn spawn(spec: ChildSpec) -> McpResult<Arc<Self>> {
        spec.validate()?;

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            message: format!("failed to spawn '{}': {}", spec.command, e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| McpError::transport("no stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("no stdout handle"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| McpError::transport("no stderr handle"))?;

        let codec = Arc::new(LineCodec::new(stdin));
        let stderr = Arc::new(StdMutex::new(StderrBuffer::new()));

        tokio::spawn(codec.clone().run_recv_loop(stdout, spec.name.clone()));

        let stderr_sink = stderr.clone();
        let label = spec.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(server = %label, "stderr: {}", line);
                if let Ok(mut buffer) = stderr_sink.lock() {
                    buffer.push(line);
                }
            }
        });

        info!(server = %spec.name, command = %spec.command, "spawned MCP child");

        Ok(Arc::new(Self {
            spec,
            child: Mutex::new(child),
            codec,
            stderr,
            initialized: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }))
    }

    /// Perform the MCP initialize handshake
    pub async fn initialize(&self) -> McpResult<()> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": ClientInfo {
                name: ORCHESTRATOR_NAME.to_string(),
                version: ORCHESTRATOR_VERSION.to_string(),
            },
        });

        let response = self
            .request("initialize", Some(params), self.spec.timeout)
            .await
            .map_err(|e| self.init_failure(e))?;

        if let Some(error) = response.error {
            return Err(McpError::InitializationFailed {
                message: format!("server rejected initialize: {}", error),
            });
        }
        if response.result.is_none() {
            return Err(McpError::InitializationFailed {
                message: "initialize response carried no result".to_string(),
            });
        }

        // Completes the handshake; servers may defer work until they see it
        self.codec.notify("notifications/initialized", None).await?;

        self.initialized.store(true, Ordering::Release);
        info!(server = %self.spec.name, "MCP child initialized");
        Ok(())
    }

    fn init_failure(&self, source: McpError) -> McpError {
        let detail = self
            .stderr
            .lock()
            .ok()
            .filter(|b| !b.is_empty())
            .map(|b| b.meaningful_error());

        let message = match detail {
            Some(stderr_phrase) => format!("{} ({})", source, stderr_phrase),
            None => source.to_string(),
        };
        McpError::InitializationFailed { message }
    }

    /// List the tools the child exposes
    pub async fn list_tools(&self) -> McpResult<Vec<Tool>> {
        let response = self.request("tools/list", None, self.spec.timeout).await?;

        if let Some(error) = response.error {
            return Err(McpError::ToolError {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        let result = response
            .result
            .ok_or_else(|| McpError::protocol("tools/list response carried no result"))?;
        let parsed: ToolsListResult = serde_json::from_value(result)?;
        Ok(parsed.tools)
    }

    /// Call a tool and return the child's result payload unchanged
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Value> {
        let params = json!({ "name": name, "arguments": arguments });
        let response = self.request("tools/call", Some(params), self.spec.timeout).await?;

        if let Some(error) = response.error {
            return Err(McpError::ToolError {
                code: error.code,
                message: error.message,
                data: error.data,
            });
        }

        response
            .result
            .ok_or_else(|| McpError::protocol("tools/call response carried no result"))
    }

    /// Send one correlated request through the codec
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<crate::protocol::JsonRpcResponse> {
        if self.dead.load(Ordering::Acquire) {
            return Err(McpError::connection_lost("client is closed"));
        }

        match self.codec.request(method, params, timeout).await {
            Err(McpError::ConnectionLost { message }) => {
                self.dead.store(true, Ordering::Release);
                let detail = self
                    .stderr
                    .lock()
                    .ok()
                    .filter(|b| !b.is_empty())
                    .map(|b| b.meaningful_error());
                Err(McpError::ConnectionLost {
                    message: match detail {
                        Some(phrase) => format!("{}: {}", message, phrase),
                        None => message,
                    },
                })
            }
            other => other,
        }
    }

    /// Whether the process is still running
    pub async fn alive(&self) -> bool {
        if self.dead.load(Ordering::Acquire) {
            return false;
        }
        let mut child = self.child.lock().await;
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.dead.store(true, Ordering::Release);
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn spec(&self) -> &ChildSpec {
        &self.spec
    }

    /// Last captured stderr phrase, if any
    pub fn last_stderr_error(&self) -> Option<String> {
        self.stderr
            .lock()
            .ok()
            .filter(|b| !b.is_empty())
            .map(|b| b.meaningful_error())
    }

    /// Close the child: stdin EOF, grace period, then kill; always reap
    pub async fn close(&self) {
        self.dead.store(true, Ordering::Release);
        self.codec.shutdown_writer().await;

        let mut child = self.child.lock().await;
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %self.spec.name, ?status, "child exited after stdin close");
            }
            Ok(Err(e)) => {
                warn!(server = %self.spec.name, error = %e, "error waiting for child");
            }
            Err(_) => {
                warn!(server = %self.spec.name, "child ignored stdin close, killing");
                if let Err(e) = child.start_kill() {
                    warn!(server = %self.spec.name, error = %e, "kill failed");
                }
                match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                    Ok(_) => {}
                    Err(_) => {
                        // SIGKILL cannot be ignored; one more blocking reap
                        let _ = child.wait().await;
                    }
                }
            }
        }

        self.codec.fail_all_pending("connection lost: client closed").await;
        info!(server = %self.spec.name, "MCP child closed");
    }

    /// One-shot connectivity probe: spawn, initialize, tear down
    ///
    /// Used by the status worker; never reuses pooled clients.
    pub async fn probe(spec: ChildSpec) -> McpResult<()> {
        let client = Self::spawn(spec).await?;
        let outcome = client.initialize().await;
        client.close().await;
        outcome
    }

    /// Probe and, on success, fetch the tool inventory in the same process
    pub async fn probe_tools(spec: ChildSpec) -> McpResult<Vec<Tool>> {
        let client = Self::spawn(spec).await?;
        let outcome = async {
            client.initialize().await?;
            client.list_tools().await
        }
        .await;
        client.close().await;
        outcome
    }
}
