//! The `switchboard` binary
//!
//! Loads configuration, wires the in-memory storage backend behind the
//! repository traits, starts the status worker, and serves the HTTP
//! surface until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use switchboard_config::ConfigLoader;
use switchboard_interfaces::{RepositoryFactory, WorkerConfig};
use switchboard_scheduler::StatusWorker;
use switchboard_security::{ChaChaSecretsProvider, TokenService};
use switchboard_server::auth::TokenIdentityResolver;
use switchboard_server::specs::SecretChildSpecFactory;
use switchboard_server::{build_router, AppContext};
use switchboard_storage::InMemoryRepositories;

#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Multi-tenant orchestrator for MCP servers")]
struct Cli {
    /// Path to a YAML configuration file; environment variables
    /// (SWITCHBOARD_*) override file values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Optional mcp-config.json seeding a default project with servers
    #[arg(short, long)]
    servers: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("configuration loading failed")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_filter())),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting switchboard");

    let secrets = Arc::new(
        ChaChaSecretsProvider::from_base64_key(&config.security.encryption_key)
            .context("encryption key is invalid")?,
    );
    let identity = Arc::new(TokenIdentityResolver::new(TokenService::new(
        config.security.jwt_secret.as_bytes().to_vec(),
        config.security.token_ttl_s,
    )));
    let specs = Arc::new(SecretChildSpecFactory::new(
        secrets.clone(),
        Duration::from_secs(config.mcp.default_timeout_s),
    ));

    let storage = InMemoryRepositories::new();
    if let Some(servers_path) = &cli.servers {
        let file = switchboard_server::bootstrap::parse_servers_file(servers_path)
            .with_context(|| format!("failed to load {}", servers_path.display()))?;
        let project = switchboard_server::bootstrap::default_project();
        let secrets_dyn: Arc<dyn switchboard_interfaces::SecretsProvider> = secrets.clone();
        let seeded =
            switchboard_server::bootstrap::seed_servers(&storage, &secrets_dyn, &project, &file)
                .await
                .context("server seeding failed")?;
        info!(project = %project.slug, seeded, "seeded servers from file");
    }
    let repositories: Arc<dyn RepositoryFactory> = Arc::new(storage);

    let worker = StatusWorker::new(
        repositories.clone(),
        specs.clone(),
        Duration::from_secs(config.mcp.probe_timeout_s),
        WorkerConfig {
            server_check_interval_s: config.worker.server_check_interval_s,
            max_workers: config.worker.max_workers,
            coalesce: config.worker.coalesce,
            max_instances: config.worker.max_instances,
        },
    );
    worker.load_config().await;
    let worker_handle = worker.start();

    let bind = format!("{}:{}", config.server.bind_address, config.server.port);
    let ctx = AppContext::new(config, repositories, identity, specs, worker);
    let janitor_handle = switchboard_server::janitor::start(ctx.clone());
    let router = build_router(ctx.clone());

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(%bind, "listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(switchboard_server::startup::shutdown_signal(ctx))
    .await
    .context("server error")?;

    janitor_handle.abort();
    worker_handle.abort();
    Ok(())
}
