//! Repository interfaces consumed by the core
//!
//! These traits are the only persistence surface the orchestrator sees.
//! Implementations manage their own transactional boundaries; callers keep
//! each invocation to one logical operation (one server update, one log
//! append) so short transactions fall out naturally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entities::{
    McpServer, McpTool, Project, ServerLogEntry, ServerStatus, ToolCallLog, ToolPreference,
    ToolSpec, WorkerConfig,
};
use crate::error::StorageResult;

/// Read access to projects
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, project_id: Uuid) -> StorageResult<Option<Project>>;

    async fn get_by_slug(&self, slug: &str) -> StorageResult<Option<Project>>;
}

/// Read/write access to MCP server rows
#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn get(&self, project_id: Uuid, server_id: Uuid) -> StorageResult<Option<McpServer>>;

    /// Look up a server by its project-unique name
    async fn get_by_name(&self, project_id: Uuid, name: &str) -> StorageResult<Option<McpServer>>;

    /// Enabled servers of one project
    async fn list_enabled(&self, project_id: Uuid) -> StorageResult<Vec<McpServer>>;

    /// Enabled servers across every project (scheduler sweep)
    async fn list_all_enabled(&self) -> StorageResult<Vec<McpServer>>;

    /// Persist a status transition observed by the orchestrator or worker
    async fn update_status(
        &self,
        server_id: Uuid,
        status: ServerStatus,
        last_error: Option<String>,
        last_started_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Bump `total_tool_calls` and `last_used_at` after a routed call
    async fn record_tool_call(&self, server_id: Uuid) -> StorageResult<()>;
}

/// Read/write access to discovered tools
#[async_trait]
pub trait ToolRepository: Send + Sync {
    async fn list(&self, server_id: Uuid) -> StorageResult<Vec<McpTool>>;

    /// Insert or refresh rows for every spec; refreshed rows keep their id
    /// and `discovered_at` but update description/schema/`last_seen_at`.
    /// Returns the number of newly inserted rows.
    async fn upsert(&self, server_id: Uuid, tools: &[ToolSpec]) -> StorageResult<usize>;

    /// Delete rows whose name is absent from `keep`; returns how many went
    async fn delete_missing(&self, server_id: Uuid, keep: &[String]) -> StorageResult<usize>;
}

/// Read/write access to per-project tool preferences
#[async_trait]
pub trait PreferenceRepository: Send + Sync {
    /// Preference map for one server; tools absent from the map are enabled
    async fn map_for_server(
        &self,
        project_id: Uuid,
        server_id: Uuid,
    ) -> StorageResult<HashMap<String, bool>>;

    async fn set(&self, preference: ToolPreference) -> StorageResult<()>;
}

/// Append-only log sinks
#[async_trait]
pub trait LogRepository: Send + Sync {
    async fn append_server_log(&self, entry: ServerLogEntry) -> StorageResult<()>;

    async fn append_tool_call(&self, entry: ToolCallLog) -> StorageResult<()>;
}

/// The singleton worker configuration row
#[async_trait]
pub trait WorkerConfigRepository: Send + Sync {
    async fn load(&self) -> StorageResult<WorkerConfig>;

    async fn save(&self, config: WorkerConfig) -> StorageResult<()>;
}

/// Factory bundling every repository behind one injection point
#[async_trait]
pub trait RepositoryFactory: Send + Sync {
    fn projects(&self) -> &dyn ProjectRepository;

    fn servers(&self) -> &dyn ServerRepository;

    fn tools(&self) -> &dyn ToolRepository;

    fn preferences(&self) -> &dyn PreferenceRepository;

    fn logs(&self) -> &dyn LogRepository;

    fn worker_config(&self) -> &dyn WorkerConfigRepository;

    /// Check that the backing store can serve requests
    async fn health_check(&self) -> StorageResult<()>;
}
