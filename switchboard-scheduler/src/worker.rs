//! The status worker implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use switchboard_interfaces::{
    LogLevel, McpServer, RepositoryFactory, ServerLogEntry, ServerStatus, WorkerConfig,
};
use switchboard_mcp::transport::stdio::{ChildClient, ChildSpecFactory};
use switchboard_mcp::McpError;

/// Retained job-history entries
const MAX_HISTORY: usize = 100;

/// Outcome record for one worker run
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub checked_count: usize,
    pub updated_count: usize,
    pub error_count: usize,
    pub tools_synced_count: usize,
    pub status: String,
}

#[derive(Default)]
struct RunCounters {
    checked: usize,
    updated: usize,
    errored: usize,
    tools_synced: usize,
}

/// Recurring server-status and tool-discovery job
pub struct StatusWorker {
    repositories: Arc<dyn RepositoryFactory>,
    specs: Arc<dyn ChildSpecFactory>,

    /// Fixed short timeout for probes, independent of per-server timeouts
    probe_timeout: Duration,

    config: RwLock<WorkerConfig>,
    history: Mutex<VecDeque<JobRun>>,

    /// Bounds overlapping runs to `max_instances`
    run_slots: Mutex<Arc<Semaphore>>,

    reschedule_tx: watch::Sender<u64>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
}

impl StatusWorker {
    pub fn new(
        repositories: Arc<dyn RepositoryFactory>,
        specs: Arc<dyn ChildSpecFactory>,
        probe_timeout: Duration,
        defaults: WorkerConfig,
    ) -> Arc<Self> {
        let defaults = defaults.clamped();
        let (reschedule_tx, _) = watch::channel(defaults.server_check_interval_s);
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            repositories,
            specs,
            probe_timeout,
            run_slots: Mutex::new(Arc::new(Semaphore::new(defaults.max_instances))),
            config: RwLock::new(defaults),
            history: Mutex::new(VecDeque::new()),
            reschedule_tx,
            shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Load the persisted configuration, falling back to current defaults
    pub async fn load_config(&self) {
        match self.repositories.worker_config().load().await {
            Ok(config) => {
                let config = config.clamped();
                info!(?config, "loaded worker config");
                self.apply_config(config).await;
            }
            Err(e) => {
                warn!(error = %e, "worker config load failed, keeping defaults");
            }
        }
    }

    /// Start the recurring loop
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::Release);
        let worker = self.clone();
        tokio::spawn(async move { worker.run_loop().await })
    }

    /// Stop the loop; in-flight runs finish on their own
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    async fn run_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut reschedule_rx = self.reschedule_tx.subscribe();

        'outer: loop {
            let (interval_s, coalesce) = {
                let config = self.config.read().await;
                (config.server_check_interval_s, config.coalesce)
            };

            info!(interval_s, coalesce, "worker scheduled");
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_s.max(1)));
            ticker.set_missed_tick_behavior(if coalesce {
                tokio::time::MissedTickBehavior::Skip
            } else {
                tokio::time::MissedTickBehavior::Burst
            });
            // The first tick of a fresh interval fires immediately;
            // consume it so runs start one interval from now
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.spawn_run().await;
                    }
                    result = reschedule_rx.changed() => {
                        if result.is_err() {
                            break 'outer;
                        }
                        info!("worker interval changed, rescheduling");
                        continue 'outer;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("worker loop stopping");
                        break 'outer;
                    }
                }
            }
        }
    }

    /// Launch one run in the background, bounded by `max_instances`
    async fn spawn_run(self: &Arc<Self>) {
        let slots = self.run_slots.lock().await.clone();
        let Ok(permit) = slots.try_acquire_owned() else {
            warn!("previous check_all_servers run still active, skipping tick");
            return;
        };

        let worker = self.clone();
        tokio::spawn(async move {
            worker.run_once().await;
            drop(permit);
        });
    }

    /// Run the job immediately; returns false if a run already occupies
    /// every instance slot
    pub async fn run_now(&self) -> bool {
        let slots = self.run_slots.lock().await.clone();
        let Ok(_permit) = slots.try_acquire_owned() else {
            return false;
        };
        self.run_once().await;
        true
    }

    /// One `check_all_servers` pass over every enabled server
    async fn run_once(&self) {
        let started = Instant::now();
        let timestamp = Utc::now();
        info!("starting scheduled server status check");

        let servers = match self.repositories.servers().list_all_enabled().await {
            Ok(servers) => servers,
            Err(e) => {
                error!(error = %e, "server listing failed, aborting run");
                self.push_history(JobRun {
                    timestamp,
                    duration_ms: started.elapsed().as_millis() as u64,
                    checked_count: 0,
                    updated_count: 0,
                    error_count: 1,
                    tools_synced_count: 0,
                    status: "error".to_string(),
                })
                .await;
                return;
            }
        };

        let max_workers = self.config.read().await.max_workers.max(1);
        let probes = Arc::new(Semaphore::new(max_workers));
        let mut tasks: JoinSet<(bool, bool, usize)> = JoinSet::new();

        for server in servers {
            let probes = probes.clone();
            let repositories = self.repositories.clone();
            let specs = self.specs.clone();
            let probe_timeout = self.probe_timeout;

            tasks.spawn(async move {
                // Errors acquiring only happen when the semaphore closes
                let Ok(_permit) = probes.acquire_owned().await else {
                    return (false, true, 0);
                };
                check_one_server(repositories, specs, probe_timeout, server).await
            });
        }

        let mut counters = RunCounters::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((updated, errored, tools_synced)) => {
                    counters.checked += 1;
                    if updated {
                        counters.updated += 1;
                    }
                    if errored {
                        counters.errored += 1;
                    }
                    counters.tools_synced += tools_synced;
                }
                Err(e) => {
                    counters.errored += 1;
                    error!(error = %e, "server check task panicked");
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            checked = counters.checked,
            updated = counters.updated,
            errors = counters.errored,
            tools_synced = counters.tools_synced,
            duration_ms,
            "scheduled server check completed"
        );

        self.push_history(JobRun {
            timestamp,
            duration_ms,
            checked_count: counters.checked,
            updated_count: counters.updated,
            error_count: counters.errored,
            tools_synced_count: counters.tools_synced,
            status: "success".to_string(),
        })
        .await;
    }

    async fn push_history(&self, run: JobRun) {
        let mut history = self.history.lock().await;
        history.push_back(run);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    /// Most recent runs, newest last
    pub async fn history(&self, limit: usize) -> Vec<JobRun> {
        let history = self.history.lock().await;
        history
            .iter()
            .skip(history.len().saturating_sub(limit))
            .cloned()
            .collect()
    }

    pub async fn config(&self) -> WorkerConfig {
        self.config.read().await.clone()
    }

    /// Replace the configuration at runtime
    ///
    /// Persists the clamped config and reschedules the loop when the
    /// interval changed.
    pub async fn update_config(&self, new_config: WorkerConfig) -> WorkerConfig {
        let new_config = new_config.clamped();

        if let Err(e) = self.repositories.worker_config().save(new_config.clone()).await {
            warn!(error = %e, "worker config persist failed");
        }

        self.apply_config(new_config.clone()).await;
        new_config
    }

    async fn apply_config(&self, new_config: WorkerConfig) {
        let old = {
            let mut config = self.config.write().await;
            let old = config.clone();
            *config = new_config.clone();
            old
        };

        if old.max_instances != new_config.max_instances {
            *self.run_slots.lock().await = Arc::new(Semaphore::new(new_config.max_instances));
        }

        if old.server_check_interval_s != new_config.server_check_interval_s
            || old.coalesce != new_config.coalesce
        {
            info!(
                from = old.server_check_interval_s,
                to = new_config.server_check_interval_s,
                "rescheduling worker"
            );
            let _ = self.reschedule_tx.send(new_config.server_check_interval_s);
        }
    }

    /// Status document for the worker endpoints
    pub async fn status(&self) -> serde_json::Value {
        let config = self.config.read().await.clone();
        let history = self.history.lock().await;
        json!({
            "running": self.is_running(),
            "config": config,
            "last_execution": history.back().map(|run| run.timestamp.to_rfc3339()),
            "job_history_count": history.len(),
        })
    }
}

/// Probe one server and reconcile its persisted state
///
/// Returns `(status_updated, errored, tools_synced)`. A failure here never
/// aborts the surrounding run.
async fn check_one_server(
    repositories: Arc<dyn RepositoryFactory>,
    specs: Arc<dyn ChildSpecFactory>,
    probe_timeout: Duration,
    server: McpServer,
) -> (bool, bool, usize) {
    let old_status = server.status;

    let spec = match specs.resolve(&server) {
        Ok(mut spec) => {
            spec.timeout = probe_timeout;
            spec
        }
        Err(e) => {
            let message = e.to_string();
            warn!(server = %server.name, error = %message, "spec resolution failed");
            persist_status(&repositories, &server, ServerStatus::Error, Some(message)).await;
            return (old_status != ServerStatus::Error, true, 0);
        }
    };

    match ChildClient::probe_tools(spec).await {
        Ok(tools) => {
            let specs: Vec<_> = tools.iter().map(|t| t.to_spec()).collect();
            let keep: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();

            let mut synced = 0;
            match repositories.tools().upsert(server.id, &specs).await {
                Ok(inserted) => synced += inserted,
                Err(e) => warn!(server = %server.name, error = %e, "tool upsert failed"),
            }
            match repositories.tools().delete_missing(server.id, &keep).await {
                Ok(deleted) => synced += deleted,
                Err(e) => warn!(server = %server.name, error = %e, "tool deletion failed"),
            }

            persist_status(&repositories, &server, ServerStatus::Active, None).await;
            let updated = old_status != ServerStatus::Active;
            if updated {
                info!(server = %server.name, tools = keep.len(), "server is active");
            } else {
                debug!(server = %server.name, tools = keep.len(), "server still active");
            }
            (updated, false, synced)
        }
        Err(e) => {
            // No response inside the window reads as offline; anything
            // else is an error worth surfacing
            let new_status = match &e {
                McpError::Timeout { .. } => ServerStatus::Inactive,
                McpError::InitializationFailed { message } if message.contains("timed out") => {
                    ServerStatus::Inactive
                }
                _ => ServerStatus::Error,
            };
            let message = e.to_string();
            warn!(server = %server.name, status = new_status.as_str(), error = %message, "probe failed");
            persist_status(&repositories, &server, new_status, Some(message)).await;
            (old_status != new_status, true, 0)
        }
    }
}

async fn persist_status(
    repositories: &Arc<dyn RepositoryFactory>,
    server: &McpServer,
    status: ServerStatus,
    error: Option<String>,
) {
    if server.status != status {
        let entry = ServerLogEntry {
            server_id: server.id,
            project_id: server.project_id,
            level: if status == ServerStatus::Active {
                LogLevel::Info
            } else {
                LogLevel::Warning
            },
            category: "status_check".to_string(),
            message: format!("status {} -> {}", server.status.as_str(), status.as_str()),
            details: error.as_ref().map(|e| json!({ "error": e })),
            timestamp: Utc::now(),
        };
        if let Err(e) = repositories.logs().append_server_log(entry).await {
            warn!(server = %server.name, error = %e, "server log append failed");
        }
    }

    if let Err(e) = repositories
        .servers()
        .update_status(server.id, status, error, None)
        .await
    {
        warn!(server = %server.name, error = %e, "status persist failed");
    }
}
