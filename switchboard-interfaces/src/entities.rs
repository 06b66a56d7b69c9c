//! Domain entities persisted through the repository layer
//!
//! Servers carry their `args`/`env` in two forms: an encrypted blob written
//! by current code and a legacy plaintext field kept for migration. The
//! secrets adapter resolves the pair to plaintext at spawn time; nothing
//! else in the workspace should read these fields directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// A tenant project grouping MCP servers behind one endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,

    pub name: String,

    /// URL-safe unique identifier
    pub slug: String,

    /// Whether the SSE GET endpoint demands an authenticated identity
    pub sse_auth_required: bool,

    /// Whether the message POST endpoint demands an authenticated identity
    pub message_auth_required: bool,

    /// Whether the unified (multi-server) endpoint is enabled
    pub unified_mcp_enabled: bool,

    /// Optional CIDR allowlist for inbound clients (`a.b.c.d/len` or bare
    /// addresses); `None` admits everyone
    pub allowed_ip_ranges: Option<Vec<String>>,

    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a configured MCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Active,
    Inactive,
    Error,
    Starting,
    Stopping,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Active => "active",
            ServerStatus::Inactive => "inactive",
            ServerStatus::Error => "error",
            ServerStatus::Starting => "starting",
            ServerStatus::Stopping => "stopping",
        }
    }
}

/// A configured stdio MCP server belonging to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServer {
    pub id: Uuid,
    pub project_id: Uuid,

    /// Unique within the project
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Executable to spawn
    pub command: String,

    /// Encrypted JSON array of command arguments (current format)
    #[serde(default)]
    pub args_encrypted: Option<String>,

    /// Legacy plaintext arguments, kept for migration reads
    #[serde(default)]
    pub args_plain: Option<Vec<String>>,

    /// Encrypted JSON object of environment variables (current format)
    #[serde(default)]
    pub env_encrypted: Option<String>,

    /// Legacy plaintext environment, kept for migration reads
    #[serde(default)]
    pub env_plain: Option<HashMap<String, String>>,

    /// Working directory for the child process
    #[serde(default)]
    pub cwd: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_s: u64,

    /// Only "stdio" is supported
    pub transport_type: String,

    pub status: ServerStatus,
    pub is_enabled: bool,

    #[serde(default)]
    pub last_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,

    pub total_tool_calls: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl McpServer {
    /// Whether the orchestrator may spawn this server
    pub fn spawnable(&self) -> bool {
        self.is_enabled && !self.command.trim().is_empty()
    }
}

/// A tool discovered on an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub id: Uuid,
    pub server_id: Uuid,

    /// Unique per server
    pub name: String,

    pub description: String,
    pub input_schema: Value,

    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,

    pub call_count: u64,
}

/// The wire-level shape of a tool as reported by a live server, used when
/// syncing inventory into persisted `McpTool` rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Value,
}

/// Per-project tool enable/disable override; absence means enabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPreference {
    pub project_id: Uuid,
    pub server_id: Uuid,
    pub tool_name: String,
    pub is_enabled: bool,
}

/// Singleton configuration for the background status worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between status-check runs (60..=3600)
    pub server_check_interval_s: u64,

    /// Parallel probe bound (1..=10)
    pub max_workers: usize,

    /// Collapse missed runs into a single catch-up run
    pub coalesce: bool,

    /// How many runs of the job may overlap
    pub max_instances: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            server_check_interval_s: 300,
            max_workers: 1,
            coalesce: true,
            max_instances: 1,
        }
    }
}

impl WorkerConfig {
    pub const MIN_INTERVAL_S: u64 = 60;
    pub const MAX_INTERVAL_S: u64 = 3600;
    pub const MAX_WORKERS: usize = 10;

    /// Return a copy with every field forced into its documented range
    pub fn clamped(&self) -> Self {
        Self {
            server_check_interval_s: self
                .server_check_interval_s
                .clamp(Self::MIN_INTERVAL_S, Self::MAX_INTERVAL_S),
            max_workers: self.max_workers.clamp(1, Self::MAX_WORKERS),
            coalesce: self.coalesce,
            max_instances: self.max_instances.max(1),
        }
    }
}

/// Severity of a server log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Append-only log line attached to a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLogEntry {
    pub server_id: Uuid,
    pub project_id: Uuid,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Failed,
}

/// Append-only record of one tools/call routed through the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallLog {
    pub server_id: Uuid,
    pub project_id: Uuid,
    pub tool_name: String,
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    pub status: CallStatus,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_clamps_to_documented_ranges() {
        let cfg = WorkerConfig {
            server_check_interval_s: 5,
            max_workers: 50,
            coalesce: false,
            max_instances: 0,
        };
        let clamped = cfg.clamped();
        assert_eq!(clamped.server_check_interval_s, 60);
        assert_eq!(clamped.max_workers, 10);
        assert_eq!(clamped.max_instances, 1);
        assert!(!clamped.coalesce);

        let default = WorkerConfig::default();
        assert_eq!(default.clamped(), default);
    }

    #[test]
    fn server_spawnable_requires_enabled_and_command() {
        let mut server = McpServer {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            name: "echo".into(),
            description: None,
            command: "mcp-echo".into(),
            args_encrypted: None,
            args_plain: None,
            env_encrypted: None,
            env_plain: None,
            cwd: None,
            timeout_s: 60,
            transport_type: "stdio".into(),
            status: ServerStatus::Inactive,
            is_enabled: true,
            last_started_at: None,
            last_error: None,
            total_tool_calls: 0,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(server.spawnable());

        server.is_enabled = false;
        assert!(!server.spawnable());

        server.is_enabled = true;
        server.command = "   ".into();
        assert!(!server.spawnable());
    }

    #[test]
    fn server_status_round_trips_through_serde() {
        let json = serde_json::to_string(&ServerStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
        let back: ServerStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ServerStatus::Active);
        assert_eq!(ServerStatus::Error.as_str(), "error");
    }
}
