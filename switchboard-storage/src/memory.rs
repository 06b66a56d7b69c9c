//! `RwLock`-table implementation of the repository contracts

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use switchboard_interfaces::{
    LogRepository, McpServer, McpTool, PreferenceRepository, Project, ProjectRepository,
    RepositoryFactory, ServerLogEntry, ServerRepository, ServerStatus, StorageError,
    StorageResult, ToolCallLog, ToolPreference, ToolRepository, ToolSpec, WorkerConfig,
    WorkerConfigRepository,
};

/// Composite key for tool preferences
type PreferenceKey = (Uuid, Uuid, String);

#[derive(Default)]
struct Tables {
    projects: RwLock<HashMap<Uuid, Project>>,
    servers: RwLock<HashMap<Uuid, McpServer>>,
    tools: RwLock<HashMap<Uuid, McpTool>>,
    preferences: RwLock<HashMap<PreferenceKey, bool>>,
    server_logs: RwLock<Vec<ServerLogEntry>>,
    tool_call_logs: RwLock<Vec<ToolCallLog>>,
    worker_config: RwLock<Option<WorkerConfig>>,
}

/// In-memory [`RepositoryFactory`]
#[derive(Default, Clone)]
pub struct InMemoryRepositories {
    tables: Arc<Tables>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a project (fixtures and the dev binary)
    pub async fn insert_project(&self, project: Project) {
        self.tables.projects.write().await.insert(project.id, project);
    }

    /// Seed a server row
    pub async fn insert_server(&self, server: McpServer) {
        self.tables.servers.write().await.insert(server.id, server);
    }

    /// Seed a tool preference
    pub async fn insert_preference(&self, preference: ToolPreference) {
        self.tables.preferences.write().await.insert(
            (
                preference.project_id,
                preference.server_id,
                preference.tool_name.clone(),
            ),
            preference.is_enabled,
        );
    }

    /// Number of appended tool-call log rows (tests)
    pub async fn tool_call_log_len(&self) -> usize {
        self.tables.tool_call_logs.read().await.len()
    }

    /// Number of appended server log rows (tests)
    pub async fn server_log_len(&self) -> usize {
        self.tables.server_logs.read().await.len()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryRepositories {
    async fn get(&self, project_id: Uuid) -> StorageResult<Option<Project>> {
        Ok(self.tables.projects.read().await.get(&project_id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> StorageResult<Option<Project>> {
        Ok(self
            .tables
            .projects
            .read()
            .await
            .values()
            .find(|p| p.slug == slug)
            .cloned())
    }
}

#[async_trait]
impl ServerRepository for InMemoryRepositories {
    async fn get(&self, project_id: Uuid, server_id: Uuid) -> StorageResult<Option<McpServer>> {
        Ok(self
            .tables
            .servers
            .read()
            .await
            .get(&server_id)
            .filter(|s| s.project_id == project_id)
            .cloned())
    }

    async fn get_by_name(&self, project_id: Uuid, name: &str) -> StorageResult<Option<McpServer>> {
        Ok(self
            .tables
            .servers
            .read()
            .await
            .values()
            .find(|s| s.project_id == project_id && s.name == name)
            .cloned())
    }

    async fn list_enabled(&self, project_id: Uuid) -> StorageResult<Vec<McpServer>> {
        let mut servers: Vec<McpServer> = self
            .tables
            .servers
            .read()
            .await
            .values()
            .filter(|s| s.project_id == project_id && s.is_enabled)
            .cloned()
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }

    async fn list_all_enabled(&self) -> StorageResult<Vec<McpServer>> {
        let mut servers: Vec<McpServer> = self
            .tables
            .servers
            .read()
            .await
            .values()
            .filter(|s| s.is_enabled)
            .cloned()
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(servers)
    }

    async fn update_status(
        &self,
        server_id: Uuid,
        status: ServerStatus,
        last_error: Option<String>,
        last_started_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let mut servers = self.tables.servers.write().await;
        let server = servers
            .get_mut(&server_id)
            .ok_or_else(|| StorageError::not_found("McpServer", server_id))?;

        debug!(server = %server.name, from = server.status.as_str(), to = status.as_str(), "status update");
        server.status = status;
        server.last_error = last_error;
        if let Some(started) = last_started_at {
            server.last_started_at = Some(started);
        }
        server.updated_at = Utc::now();
        Ok(())
    }

    async fn record_tool_call(&self, server_id: Uuid) -> StorageResult<()> {
        let mut servers = self.tables.servers.write().await;
        let server = servers
            .get_mut(&server_id)
            .ok_or_else(|| StorageError::not_found("McpServer", server_id))?;
        server.total_tool_calls += 1;
        server.last_used_at = Some(Utc::now());
        Ok(())
    }
}

#[async_trait]
impl ToolRepository for InMemoryRepositories {
    async fn list(&self, server_id: Uuid) -> StorageResult<Vec<McpTool>> {
        let mut tools: Vec<McpTool> = self
            .tables
            .tools
            .read()
            .await
            .values()
            .filter(|t| t.server_id == server_id)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn upsert(&self, server_id: Uuid, specs: &[ToolSpec]) -> StorageResult<usize> {
        let mut tools = self.tables.tools.write().await;
        let now = Utc::now();
        let mut inserted = 0;

        for spec in specs {
            let existing = tools
                .values_mut()
                .find(|t| t.server_id == server_id && t.name == spec.name);

            match existing {
                Some(tool) => {
                    tool.description = spec.description.clone();
                    tool.input_schema = spec.input_schema.clone();
                    tool.last_seen_at = now;
                }
                None => {
                    let tool = McpTool {
                        id: Uuid::new_v4(),
                        server_id,
                        name: spec.name.clone(),
                        description: spec.description.clone(),
                        input_schema: spec.input_schema.clone(),
                        discovered_at: now,
                        last_seen_at: now,
                        call_count: 0,
                    };
                    tools.insert(tool.id, tool);
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    async fn delete_missing(&self, server_id: Uuid, keep: &[String]) -> StorageResult<usize> {
        let mut tools = self.tables.tools.write().await;
        let stale: Vec<Uuid> = tools
            .values()
            .filter(|t| t.server_id == server_id && !keep.contains(&t.name))
            .map(|t| t.id)
            .collect();

        for id in &stale {
            tools.remove(id);
        }
        Ok(stale.len())
    }
}

#[async_trait]
impl PreferenceRepository for InMemoryRepositories {
    async fn map_for_server(
        &self,
        project_id: Uuid,
        server_id: Uuid,
    ) -> StorageResult<HashMap<String, bool>> {
        Ok(self
            .tables
            .preferences
            .read()
            .await
            .iter()
            .filter(|((p, s, _), _)| *p == project_id && *s == server_id)
            .map(|((_, _, name), enabled)| (name.clone(), *enabled))
            .collect())
    }

    async fn set(&self, preference: ToolPreference) -> StorageResult<()> {
        self.insert_preference(preference).await;
        Ok(())
    }
}

#[async_trait]
impl LogRepository for InMemoryRepositories {
    async fn append_server_log(&self, entry: ServerLogEntry) -> StorageResult<()> {
        self.tables.server_logs.write().await.push(entry);
        Ok(())
    }

    async fn append_tool_call(&self, entry: ToolCallLog) -> StorageResult<()> {
        self.tables.tool_call_logs.write().await.push(entry);
        Ok(())
    }
}

#[async_trait]
impl WorkerConfigRepository for InMemoryRepositories {
    async fn load(&self) -> StorageResult<WorkerConfig> {
        Ok(self
            .tables
            .worker_config
            .read()
            .await
            .clone()
            .unwrap_or_default())
    }

    async fn save(&self, config: WorkerConfig) -> StorageResult<()> {
        *self.tables.worker_config.write().await = Some(config);
        Ok(())
    }
}

#[async_trait]
impl RepositoryFactory for InMemoryRepositories {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server(project_id: Uuid, name: &str, enabled: bool) -> McpServer {
        McpServer {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            description: None,
            command: "mcp-fixture".into(),
            args_encrypted: None,
            args_plain: None,
            env_encrypted: None,
            env_plain: None,
            cwd: None,
            timeout_s: 60,
            transport_type: "stdio".into(),
            status: ServerStatus::Inactive,
            is_enabled: enabled,
            last_started_at: None,
            last_error: None,
            total_tool_calls: 0,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            description: format!("{} tool", name),
            input_schema: json!({"type": "object"}),
        }
    }

    #[tokio::test]
    async fn list_enabled_filters_and_sorts() {
        let repos = InMemoryRepositories::new();
        let project = Uuid::new_v4();
        repos.insert_server(server(project, "zeta", true)).await;
        repos.insert_server(server(project, "alpha", true)).await;
        repos.insert_server(server(project, "mid", false)).await;
        repos.insert_server(server(Uuid::new_v4(), "other", true)).await;

        let enabled = repos.list_enabled(project).await.unwrap();
        let names: Vec<&str> = enabled.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn upsert_then_delete_missing_reconciles() {
        let repos = InMemoryRepositories::new();
        let server_id = Uuid::new_v4();

        let inserted = repos.upsert(server_id, &[spec("x"), spec("y")]).await.unwrap();
        assert_eq!(inserted, 2);

        // Second discovery: y stays, z appears, x is gone
        let inserted = repos.upsert(server_id, &[spec("y"), spec("z")]).await.unwrap();
        assert_eq!(inserted, 1);
        let deleted = repos
            .delete_missing(server_id, &["y".into(), "z".into()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let names: Vec<String> = repos
            .list(server_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["y".to_string(), "z".to_string()]);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let repos = InMemoryRepositories::new();
        let server_id = Uuid::new_v4();

        repos.upsert(server_id, &[spec("a")]).await.unwrap();
        let first = repos.list(server_id).await.unwrap();
        let original_id = first[0].id;
        let discovered_at = first[0].discovered_at;

        repos.upsert(server_id, &[spec("a")]).await.unwrap();
        let second = repos.list(server_id).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, original_id);
        assert_eq!(second[0].discovered_at, discovered_at);
    }

    #[tokio::test]
    async fn status_update_and_counters() {
        let repos = InMemoryRepositories::new();
        let project = Uuid::new_v4();
        let row = server(project, "svc", true);
        let server_id = row.id;
        repos.insert_server(row).await;

        repos
            .update_status(server_id, ServerStatus::Error, Some("boom".into()), None)
            .await
            .unwrap();
        let loaded = ServerRepository::get(&repos, project, server_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ServerStatus::Error);
        assert_eq!(loaded.last_error.as_deref(), Some("boom"));

        repos.record_tool_call(server_id).await.unwrap();
        repos.record_tool_call(server_id).await.unwrap();
        let loaded = ServerRepository::get(&repos, project, server_id).await.unwrap().unwrap();
        assert_eq!(loaded.total_tool_calls, 2);
        assert!(loaded.last_used_at.is_some());

        let missing = repos
            .update_status(Uuid::new_v4(), ServerStatus::Active, None, None)
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn preference_map_is_scoped() {
        let repos = InMemoryRepositories::new();
        let project = Uuid::new_v4();
        let server_id = Uuid::new_v4();

        repos
            .set(ToolPreference {
                project_id: project,
                server_id,
                tool_name: "hidden".into(),
                is_enabled: false,
            })
            .await
            .unwrap();
        repos
            .set(ToolPreference {
                project_id: Uuid::new_v4(),
                server_id,
                tool_name: "other_project".into(),
                is_enabled: false,
            })
            .await
            .unwrap();

        let map = repos.map_for_server(project, server_id).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("hidden"), Some(&false));
    }

    #[tokio::test]
    async fn worker_config_round_trip() {
        let repos = InMemoryRepositories::new();
        assert_eq!(repos.load().await.unwrap(), WorkerConfig::default());

        let config = WorkerConfig {
            server_check_interval_s: 120,
            max_workers: 3,
            coalesce: false,
            max_instances: 1,
        };
        repos.save(config.clone()).await.unwrap();
        assert_eq!(repos.load().await.unwrap(), config);
    }
}
