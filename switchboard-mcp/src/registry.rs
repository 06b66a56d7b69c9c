//! Process-scoped registries
//!
//! Two maps: live child clients keyed by `(project_id, server_id)`, and
//! live SSE session transports keyed by session id. Both are plain handles
//! created at startup and passed into handlers; nothing here is global.
//!
//! The child pool installs a `Starting` placeholder before spawning so that
//! concurrent callers for the same server coalesce onto one spawn instead
//! of racing. A dead client is disposed on next use; the next caller pays
//! the spawn cost.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{McpError, McpResult};
use crate::session::SessionTransport;
use crate::transport::stdio::{ChildClient, ChildSpec};

/// Pool key: one client per server per project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub project_id: Uuid,
    pub server_id: Uuid,
}

impl ClientKey {
    pub fn new(project_id: Uuid, server_id: Uuid) -> Self {
        Self {
            project_id,
            server_id,
        }
    }
}

enum PoolSlot {
    /// A spawn is in flight; wait on the notify and retry
    Starting(Arc<Notify>),
    Ready(Arc<ChildClient>),
}

/// Snapshot of a pool slot taken under the lock
enum Slot {
    Ready(Arc<ChildClient>),
    Starting(Arc<Notify>),
    Vacant,
}

/// Pool of live child clients, shared between sessions
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ClientKey, PoolSlot>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a live, initialized client for `key`, spawning one if needed
    ///
    /// `make_spec` is only invoked when a spawn is actually required, so
    /// callers do not decrypt args/env for the common pooled-hit path.
    pub async fn get_or_spawn<F>(&self, key: ClientKey, make_spec: F) -> McpResult<Arc<ChildClient>>
    where
        F: Fn() -> McpResult<ChildSpec>,
    {
        loop {
            let slot = {
                let clients = self.clients.lock().await;
                match clients.get(&key) {
                    Some(PoolSlot::Ready(client)) => Slot::Ready(client.clone()),
                    Some(PoolSlot::Starting(notify)) => Slot::Starting(notify.clone()),
                    None => Slot::Vacant,
                }
            };

            match slot {
                Slot::Ready(client) => {
                    if client.alive().await {
                        return Ok(client);
                    }
                    // Dead client: dispose and retry, which respawns
                    debug!(server = %key.server_id, "disposing dead pooled client");
                    {
                        let mut clients = self.clients.lock().await;
                        if let Some(PoolSlot::Ready(existing)) = clients.get(&key) {
                            if Arc::ptr_eq(existing, &client) {
                                clients.remove(&key);
                            }
                        }
                    }
                    tokio::spawn(async move { client.close().await });
                    continue;
                }
                Slot::Starting(notify) => {
                    // Another caller is spawning this server. The bounded
                    // wait covers the window where its notify_waiters fired
                    // before we started listening.
                    let _ = tokio::time::timeout(
                        std::time::Duration::from_millis(100),
                        notify.notified(),
                    )
                    .await;
                    continue;
                }
                Slot::Vacant => {}
            }

            // Install the placeholder (unless someone beat us to it)
            let notify = Arc::new(Notify::new());
            {
                let mut clients = self.clients.lock().await;
                if clients.contains_key(&key) {
                    continue;
                }
                clients.insert(key, PoolSlot::Starting(notify.clone()));
            }

            let result = self.spawn_and_init(make_spec()).await;

            {
                let mut clients = self.clients.lock().await;
                match &result {
                    Ok(client) => {
                        clients.insert(key, PoolSlot::Ready(client.clone()));
                    }
                    Err(e) => {
                        warn!(server = %key.server_id, error = %e, "spawn failed, releasing placeholder");
                        clients.remove(&key);
                    }
                }
            }
            notify.notify_waiters();

            return result;
        }
    }

    async fn spawn_and_init(&self, spec: McpResult<ChildSpec>) -> McpResult<Arc<ChildClient>> {
        let client = ChildClient::spawn(spec?).await?;
        if let Err(e) = client.initialize().await {
            client.close().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Peek at a pooled client without spawning
    pub async fn get(&self, key: &ClientKey) -> Option<Arc<ChildClient>> {
        match self.clients.lock().await.get(key) {
            Some(PoolSlot::Ready(client)) => Some(client.clone()),
            _ => None,
        }
    }

    /// Remove and close the client for one server
    pub async fn evict(&self, key: &ClientKey) {
        let slot = self.clients.lock().await.remove(key);
        if let Some(PoolSlot::Ready(client)) = slot {
            client.close().await;
        }
    }

    /// Number of pooled (ready) clients
    pub async fn len(&self) -> usize {
        self.clients
            .lock()
            .await
            .values()
            .filter(|slot| matches!(slot, PoolSlot::Ready(_)))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Close every pooled client (process shutdown)
    pub async fn shutdown(&self) {
        let slots: Vec<_> = self.clients.lock().await.drain().collect();
        info!(count = slots.len(), "closing pooled MCP clients");
        for (_, slot) in slots {
            if let Some(client) = match slot {
                PoolSlot::Ready(client) => Some(client),
                PoolSlot::Starting(_) => None,
            } {
                client.close().await;
            }
        }
    }
}

/// Map of live SSE session transports
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<SessionTransport>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transport: Arc<SessionTransport>) {
        self.sessions
            .write()
            .await
            .insert(transport.session_id(), transport);
    }

    /// Resolve a session id to its transport
    pub async fn get(&self, session_id: Uuid) -> Option<Arc<SessionTransport>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn remove(&self, session_id: Uuid) -> Option<Arc<SessionTransport>> {
        self.sessions.write().await.remove(&session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Ids of every registered session
    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Signal every session to close (process shutdown)
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (_, session) in sessions {
            session.close().await;
        }
    }
}
