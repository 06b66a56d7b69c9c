//! Seeding from an `mcp-config.json` file
//!
//! The in-memory backend starts empty, so the binary accepts a standard
//! `mcpServers` definition file and materializes a project plus encrypted
//! server rows from it. Args and env are sealed before they touch the
//! repository; the plaintext lives only inside this function.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use switchboard_interfaces::{McpServer, Project, SecretsProvider, ServerStatus};
use switchboard_security::{seal_args, seal_env};
use switchboard_storage::InMemoryRepositories;

/// One server entry in the `mcpServers` map
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_transport", rename = "transportType")]
    pub transport_type: String,

    #[serde(default)]
    pub disabled: bool,
}

fn default_timeout() -> u64 {
    60
}

fn default_transport() -> String {
    "stdio".to_string()
}

/// Shape of an `mcp-config.json` file
#[derive(Debug, Clone, Deserialize)]
pub struct McpServersFile {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: HashMap<String, ServerEntry>,
}

/// Errors raised while seeding
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Failed to read servers file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse servers file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Failed to seal server secrets: {0}")]
    Seal(#[from] switchboard_interfaces::SecretsError),
}

/// A development project with every endpoint open
pub fn default_project() -> Project {
    Project {
        id: Uuid::new_v4(),
        name: "Default".to_string(),
        slug: "default".to_string(),
        sse_auth_required: false,
        message_auth_required: false,
        unified_mcp_enabled: true,
        allowed_ip_ranges: None,
        created_at: Utc::now(),
    }
}

/// Parse an `mcpServers` file
pub fn parse_servers_file(path: impl AsRef<Path>) -> Result<McpServersFile, BootstrapError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Seed a project and its servers from a parsed `mcpServers` file
///
/// Entries marked `disabled` become rows with `is_enabled=false`; entries
/// without a command are skipped. Returns the number of seeded servers.
///
/// Seeding writes rows directly, so it addresses the storage backend the
/// binary owns rather than the read-mostly repository traits; server CRUD
/// proper lives outside the orchestrator.
pub async fn seed_servers(
    repositories: &InMemoryRepositories,
    secrets: &Arc<dyn SecretsProvider>,
    project: &Project,
    file: &McpServersFile,
) -> Result<usize, BootstrapError> {
    repositories.insert_project(project.clone()).await;
    let mut seeded = 0;

    for (name, entry) in &file.mcp_servers {
        if entry.command.trim().is_empty() {
            warn!(server = %name, "skipping entry without a command");
            continue;
        }
        if entry.transport_type != "stdio" {
            warn!(server = %name, transport = %entry.transport_type, "skipping non-stdio entry");
            continue;
        }

        let now = Utc::now();
        let server = McpServer {
            id: Uuid::new_v4(),
            project_id: project.id,
            name: name.clone(),
            description: None,
            command: entry.command.clone(),
            args_encrypted: Some(seal_args(secrets.as_ref(), &entry.args)?),
            args_plain: None,
            env_encrypted: Some(seal_env(secrets.as_ref(), &entry.env)?),
            env_plain: None,
            cwd: None,
            timeout_s: entry.timeout,
            transport_type: entry.transport_type.clone(),
            status: ServerStatus::Inactive,
            is_enabled: !entry.disabled,
            last_started_at: None,
            last_error: None,
            total_tool_calls: 0,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };

        info!(server = %name, enabled = server.is_enabled, "seeded MCP server");
        repositories.insert_server(server).await;
        seeded += 1;
    }

    Ok(seeded)
}
