//! Application context shared by every handler

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;
use uuid::Uuid;

use switchboard_config::SwitchboardConfig;
use switchboard_interfaces::{IdentityResolver, RepositoryFactory};
use switchboard_mcp::transport::stdio::ChildSpecFactory;
use switchboard_mcp::{
    ClientRegistry, McpMetrics, SessionConfig, SessionHandler, SessionRegistry, UnifiedSession,
};
use switchboard_scheduler::StatusWorker;

/// Process-scoped handles; created at startup, passed into handlers
pub struct AppContext {
    pub config: SwitchboardConfig,
    pub repositories: Arc<dyn RepositoryFactory>,
    pub identity: Arc<dyn IdentityResolver>,
    pub specs: Arc<dyn ChildSpecFactory>,

    pub clients: Arc<ClientRegistry>,
    pub sessions: Arc<SessionRegistry>,

    /// Unified facades keyed by session id, alongside `sessions`
    pub unified: RwLock<HashMap<Uuid, Arc<UnifiedSession>>>,

    pub handler: SessionHandler,
    pub worker: Arc<StatusWorker>,
    pub metrics: Arc<McpMetrics>,

    pub started_at: Instant,
}

impl AppContext {
    pub fn new(
        config: SwitchboardConfig,
        repositories: Arc<dyn RepositoryFactory>,
        identity: Arc<dyn IdentityResolver>,
        specs: Arc<dyn ChildSpecFactory>,
        worker: Arc<StatusWorker>,
    ) -> Arc<Self> {
        let clients = Arc::new(ClientRegistry::new());
        let sessions = Arc::new(SessionRegistry::new());
        let metrics = Arc::new(McpMetrics::new());
        let handler = SessionHandler::new(
            clients.clone(),
            repositories.clone(),
            specs.clone(),
            metrics.clone(),
        );

        Arc::new(Self {
            config,
            repositories,
            identity,
            specs,
            clients,
            sessions,
            unified: RwLock::new(HashMap::new()),
            handler,
            worker,
            metrics,
            started_at: Instant::now(),
        })
    }

    /// Session-transport tunables from the loaded configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            queue_capacity: self.config.mcp.session_queue_capacity,
            keepalive_interval: std::time::Duration::from_secs(self.config.mcp.keepalive_interval_s),
        }
    }

    /// Deregister a session from both maps
    pub async fn drop_session(&self, session_id: Uuid) {
        self.sessions.remove(session_id).await;
        self.unified.write().await.remove(&session_id);
    }

    /// Close everything owned by this context (process shutdown)
    pub async fn shutdown(&self) {
        self.worker.stop();
        self.sessions.shutdown().await;
        self.unified.write().await.clear();
        self.clients.shutdown().await;
    }
}
